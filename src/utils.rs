use rand::Rng;

pub fn format_token_amount(amount: u64, decimals: u32) -> String {
    format!(
        "{:.*}",
        decimals as usize,
        amount as f64 / 10f64.powi(decimals as i32)
    )
}

/// Round a gateway-facing decimal amount to the asset's minimum unit.
pub fn to_base_units(amount: f64, decimals: u32) -> u64 {
    (amount * 10f64.powi(decimals as i32)).round() as u64
}

pub fn to_decimal(amount: u64, decimals: u32) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// Shared secret for the gateway withdraw URL.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Best-effort public IP lookup used when advertising the withdraw URL.
pub async fn public_ip(client: &reqwest::Client) -> String {
    match client.get("https://ipv4.icanhazip.com/").send().await {
        Ok(resp) => match resp.text().await {
            Ok(body) if !body.trim().is_empty() => body.trim().to_string(),
            _ => "localhost".to_string(),
        },
        Err(_) => "localhost".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_unit_conversion_rounds_to_minimum_unit() {
        assert_eq!(to_base_units(1.5, 0), 2);
        assert_eq!(to_base_units(1.4, 0), 1);
        assert_eq!(to_base_units(2.5, 6), 2_500_000);
        assert_eq!(to_base_units(0.000_000_4, 6), 0);
    }

    #[test]
    fn token_amount_formatting() {
        assert_eq!(format_token_amount(2_500_000, 6), "2.500000");
        assert_eq!(format_token_amount(7, 0), "7");
    }

    #[test]
    fn secrets_are_distinct() {
        assert_ne!(generate_secret(), generate_secret());
        assert_eq!(generate_secret().len(), 16);
    }
}
