//! User profile and wallet models.
//!
//! The backend embeds the user's wallets in both the login response and
//! the profile response. Balances arrive either as JSON numbers or as
//! numeric strings depending on the endpoint, so both are accepted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub wallets: Vec<Wallet>,
}

impl UserProfile {
    /// The wallet flagged as default, falling back to the first one.
    pub fn primary_wallet(&self) -> Option<&Wallet> {
        self.wallets
            .iter()
            .find(|w| w.is_default)
            .or_else(|| self.wallets.first())
    }

    /// Balance of the primary wallet, or zero when the user has none or
    /// the balance is not a finite number.
    pub fn primary_balance(&self) -> f64 {
        self.primary_wallet()
            .map(|w| w.balance)
            .filter(|b| b.is_finite())
            .unwrap_or(0.0)
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) if !first.is_empty() => format!("{} {}", first, last),
            (Some(first), _) if !first.is_empty() => first.clone(),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub balance: f64,
    #[serde(default, alias = "isPrimary", deserialize_with = "deserialize_string_bool")]
    pub is_default: bool,
}

// "NaN" and "inf" parse as f64 but are not balances
fn finite_amount<E: serde::de::Error>(amount: f64, raw: &str) -> Result<f64, E> {
    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(E::custom(format!("invalid amount: {}", raw)))
    }
}

// Helper to deserialize a number or a numeric string as f64
fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct AmountVisitor;

    impl<'de> de::Visitor<'de> for AmountVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or numeric string")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            finite_amount(v, &v.to_string())
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v as f64)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v as f64)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let trimmed = v.trim().replace(',', "");
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            let amount = trimmed
                .parse::<f64>()
                .map_err(|_| E::custom(format!("invalid amount: {}", v)))?;
            finite_amount(amount, v)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(0.0)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(0.0)
        }
    }

    deserializer.deserialize_any(AmountVisitor)
}

// Helper to deserialize "true"/"false" strings or actual bools
fn deserialize_string_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct BoolVisitor;

    impl<'de> de::Visitor<'de> for BoolVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a boolean or string 'true'/'false'")
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v != 0)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v != 0)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(false)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(false)
        }
    }

    deserializer.deserialize_any(BoolVisitor)
}
