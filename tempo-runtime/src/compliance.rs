//! Optional operator compliance hooks for the quote and debug-emit surfaces.

use std::collections::HashSet;

use crate::error::TempoError;
use crate::settings::Settings;

fn csv_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Enforce geofencing and wallet sanctions when enabled; a no-op otherwise.
pub fn enforce_optional_compliance(
    settings: &Settings,
    country_code: Option<&str>,
    wallet_address: Option<&str>,
) -> Result<(), TempoError> {
    if !settings.compliance_enforcement_enabled {
        return Ok(());
    }

    let blocked_countries = csv_set(&settings.compliance_blocked_countries);
    let blocked_wallets = csv_set(&settings.compliance_sanctions_blocked_wallets);

    if let Some(country) = country_code {
        if !country.is_empty() && blocked_countries.contains(&country.to_lowercase()) {
            return Err(TempoError::rejection(
                451,
                "Request blocked by operator geofencing policy",
            ));
        }
    }

    if let Some(wallet) = wallet_address {
        if !wallet.is_empty() && blocked_wallets.contains(&wallet.to_lowercase()) {
            return Err(TempoError::rejection(
                403,
                "Wallet blocked by operator sanctions policy",
            ));
        }
    }

    Ok(())
}
