//! Check command - tests the configured collection.

use anyhow::{Context, Result};
use colored::Colorize;

use ir_connectors::{Connector, ConnectorHealth, InthreatConnector};

use crate::config::AppConfig;

/// Result of a connection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub connector: String,
    pub collection: String,
    pub health: ConnectorHealth,
}

impl CheckOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self.health, ConnectorHealth::Healthy)
    }
}

/// Requests one record from the collection with the configured credentials.
pub async fn check_connection(config: &AppConfig) -> Result<CheckOutcome> {
    let inthreat = config.inthreat_config()?;
    let collection = inthreat.collection.clone();
    let connector =
        InthreatConnector::new(inthreat).context("Failed to create Inthreat connector")?;

    query_health(&connector, collection).await
}

async fn query_health(connector: &dyn Connector, collection: String) -> Result<CheckOutcome> {
    let health = connector.health_check().await?;
    Ok(CheckOutcome {
        connector: connector.name().to_string(),
        collection,
        health,
    })
}

/// Prints a check result for humans.
pub fn print_outcome(outcome: &CheckOutcome) {
    println!("{}", "Connection Check".bold());
    println!("─────────────────────");
    println!("Connector:  {}", outcome.connector);
    println!("Collection: {}", outcome.collection);
    match &outcome.health {
        ConnectorHealth::Healthy => println!("Status:     {}", "healthy".green()),
        ConnectorHealth::Degraded(reason) => {
            println!("Status:     {} ({})", "degraded".yellow(), reason)
        }
        ConnectorHealth::Unhealthy(reason) => {
            println!("Status:     {} ({})", "unhealthy".red(), reason)
        }
    }
}
