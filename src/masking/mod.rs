use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single field-level masking rule, applied during restore before data
/// lands in the target database. Grounded in the original platform's
/// `DataMaskingService` (backend/app/services/data_masking.py).
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MaskStrategy {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Name,
    Address,
    Hash,
    Randomize,
    Null,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MaskingRule {
    pub table: String,
    pub column: String,
    pub strategy: MaskStrategy,
}

pub fn apply_strategy(strategy: MaskStrategy, value: &str) -> String {
    match strategy {
        MaskStrategy::Email => mask_email(value),
        MaskStrategy::Phone => mask_phone(value),
        MaskStrategy::Ssn => mask_ssn(value),
        MaskStrategy::CreditCard => mask_credit_card(value),
        MaskStrategy::Name => mask_name(value),
        MaskStrategy::Address => mask_address(value),
        MaskStrategy::Hash => hash_value(value),
        MaskStrategy::Randomize => randomize_string(value),
        MaskStrategy::Null => String::new(),
    }
}

fn mask_email(value: &str) -> String {
    match value.split_once('@') {
        Some((local, domain)) => {
            let visible = local.chars().take(2).collect::<String>();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}

fn mask_phone(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "*".repeat(value.len());
    }
    let tail = &digits[digits.len() - 4..];
    format!("***-***-{tail}")
}

fn mask_ssn(_value: &str) -> String {
    "***-**-****".to_string()
}

fn mask_credit_card(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "*".repeat(value.len());
    }
    let tail = &digits[digits.len() - 4..];
    format!("****-****-****-{tail}")
}

fn mask_name(value: &str) -> String {
    value
        .split_whitespace()
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => format!("{first}{}", "*".repeat(chars.count())),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn mask_address(_value: &str) -> String {
    "[REDACTED ADDRESS]".to_string()
}

fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

fn randomize_string(value: &str) -> String {
    let mut rng = rand::thread_rng();
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                let set: &[u8] = if c.is_ascii_digit() {
                    b"0123456789"
                } else {
                    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ"
                };
                set[rng.gen_range(0..set.len())] as char
            } else {
                c
            }
        })
        .collect()
}

/// Builds the per-database-family UPDATE statement that applies a masking
/// rule to every row of a table. Callers run these through the Executor
/// after restoring into a scratch schema, before the restore is promoted.
pub fn generate_masking_statement(rule: &MaskingRule, database_family: &str) -> String {
    let placeholder = match rule.strategy {
        MaskStrategy::Null => "NULL".to_string(),
        _ => format!("'{}'", apply_strategy(rule.strategy, "<value>").replace('\'', "''")),
    };
    match database_family {
        "postgresql" => format!(
            "UPDATE \"{}\" SET \"{}\" = {} WHERE \"{}\" IS NOT NULL;",
            rule.table, rule.column, placeholder, rule.column
        ),
        "mysql" => format!(
            "UPDATE `{}` SET `{}` = {} WHERE `{}` IS NOT NULL;",
            rule.table, rule.column, placeholder, rule.column
        ),
        _ => format!(
            "-- masking not supported as SQL for database family '{}': {}.{}",
            database_family, rule.table, rule.column
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_keeps_domain() {
        let masked = mask_email("jane.doe@example.com");
        assert!(masked.ends_with("@example.com"));
        assert!(masked.starts_with("ja"));
    }

    #[test]
    fn credit_card_keeps_last_four() {
        let masked = mask_credit_card("4111 1111 1111 1234");
        assert!(masked.ends_with("1234"));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_value("abc"), hash_value("abc"));
    }

    #[test]
    fn null_strategy_produces_sql_null() {
        let rule = MaskingRule {
            table: "users".to_string(),
            column: "ssn".to_string(),
            strategy: MaskStrategy::Null,
        };
        let stmt = generate_masking_statement(&rule, "postgresql");
        assert!(stmt.contains("= NULL"));
    }
}
