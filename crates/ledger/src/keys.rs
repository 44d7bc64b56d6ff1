//! Ledger key layout.

pub const ACCOUNT_INDEX: &str = "index:accounts";
pub const DEAL_INDEX: &str = "index:deals";
pub const TRANSACTION_INDEX: &str = "index:transactions";

pub fn account(account_number: &str) -> String {
    format!("account:{account_number}")
}

pub fn holding(account_number: &str, security_id: &str) -> String {
    format!("holding:{account_number}:{security_id}")
}

pub fn deal(deal_id: &str) -> String {
    format!("deal:{deal_id}")
}

pub fn transaction(transaction_id: &str) -> String {
    format!("transaction:{transaction_id}")
}
