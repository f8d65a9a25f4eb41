use std::str::FromStr;

use procure_core::approvals::{ApprovalStore, AuthorityTable, ResolverStrategy};
use procure_core::config::{AppConfig, LoadOptions};
use procure_db::{connection::connect_with_config, SqlApprovalStore};
use rust_decimal::Decimal;
use serde_json::json;

use crate::commands::{current_thread_runtime, CommandResult};

pub fn run(raw_amount: &str) -> CommandResult {
    let amount = match Decimal::from_str(raw_amount.trim()) {
        Ok(amount) if amount >= Decimal::ZERO => amount,
        Ok(_) => {
            return CommandResult::failure(
                "resolve",
                "invalid_input",
                format!("amount must not be negative: `{raw_amount}`"),
                2,
            );
        }
        Err(error) => {
            return CommandResult::failure(
                "resolve",
                "invalid_input",
                format!("amount `{raw_amount}` is not a decimal number: {error}"),
                2,
            );
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "resolve",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let resolver = config.approvals.resolver;
    let authorities = match resolver {
        ResolverStrategy::Brackets => AuthorityTable::default(),
        ResolverStrategy::AuthorityLadder => match load_authorities(&config) {
            Ok(authorities) => authorities,
            Err(failure) => return failure,
        },
    };

    let required_role = resolver.required_role(amount, &authorities);
    CommandResult::success_with_details(
        "resolve",
        format!("an order of {amount} requires approval by {required_role}"),
        Some(json!({
            "amount": amount.to_string(),
            "requiredRole": required_role,
            "resolver": resolver.as_str(),
        })),
    )
}

fn load_authorities(config: &AppConfig) -> Result<AuthorityTable, CommandResult> {
    let runtime = current_thread_runtime("resolve")?;

    runtime.block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| {
            CommandResult::failure("resolve", "db_connectivity", error.to_string(), 4)
        })?;
        let store = SqlApprovalStore::new(pool.clone());
        let authorities = store.get_approval_authorities().await.map_err(|error| {
            CommandResult::failure("resolve", "authority_lookup", error.to_string(), 5)
        });
        pool.close().await;
        Ok::<AuthorityTable, CommandResult>(AuthorityTable::new(authorities?))
    })
}
