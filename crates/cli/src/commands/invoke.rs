//! Commands that call a running agent

use anyhow::Result;
use colored::Colorize;
use guard_lib::health::HealthResponse;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::read_json;
use crate::client::ApiClient;
use crate::output::{color_status, color_status_code, print_json, print_table, OutputFormat};

/// Agent route for each event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    Alarm,
    Reboot,
    Inference,
}

impl EventRoute {
    pub fn path(&self) -> &'static str {
        match self {
            EventRoute::Alarm => "v1/alarms",
            EventRoute::Reboot => "v1/reboot",
            EventRoute::Inference => "v1/inference",
        }
    }
}

/// Row for the component health table
#[derive(Tabled, Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Send an event file to the agent and print the envelope
pub async fn send_event(
    client: &ApiClient,
    route: EventRoute,
    event: &Path,
    format: OutputFormat,
) -> Result<()> {
    let payload = read_json(event)?;
    let response = client.post_event(route.path(), &payload).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            println!(
                "{} {}",
                color_status_code(response.status_code),
                response.body
            );
        }
    }

    if response.status_code != 200 {
        anyhow::bail!("Agent answered with status {}", response.status_code);
    }
    Ok(())
}

/// Show the agent's component health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&health),
        OutputFormat::Table => {
            println!(
                "{} {}",
                "Agent status:".bold(),
                color_status(health.status.as_str())
            );
            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    component: name.clone(),
                    status: color_status(component.status.as_str()),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            print_table(&rows, format);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(EventRoute::Alarm.path(), "v1/alarms");
        assert_eq!(EventRoute::Reboot.path(), "v1/reboot");
        assert_eq!(EventRoute::Inference.path(), "v1/inference");
    }

    #[tokio::test]
    async fn test_send_event_fails_on_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/alarms")
            .with_status(400)
            .with_body(r#"{"statusCode": 400, "body": "invalid event: no target"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let event = dir.path().join("event.json");
        std::fs::write(&event, "{}").unwrap();

        let client = ApiClient::new(&server.url()).unwrap();
        let err = send_event(&client, EventRoute::Alarm, &event, OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
