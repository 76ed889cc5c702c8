//! Local clock tool. Models have no sense of "now", so scheduling and age
//! questions route through this.

use async_trait::async_trait;
use streamgate_core::{Tool, ToolContext, ToolError};

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date and time. Use this when you need to know the current \
         date, time, or day of the week for scheduling or age calculations."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> std::result::Result<String, ToolError> {
        Ok(format_now(chrono::Local::now()))
    }
}

fn format_now(now: chrono::DateTime<chrono::Local>) -> String {
    format!(
        "Current Local Time: {}",
        now.format("%Y-%m-%d %H:%M:%S %A")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_includes_date_and_weekday() {
        let dt = chrono::Local.with_ymd_and_hms(2026, 2, 6, 9, 2, 6).unwrap();
        let out = format_now(dt);
        assert!(out.starts_with("Current Local Time: 2026-02-06 09:02:06"));
        assert!(out.ends_with("Friday"));
    }

    #[tokio::test]
    async fn execute_ignores_arguments() {
        let tool = CurrentTimeTool;
        let out = tool
            .execute(serde_json::json!({"junk": true}), &ToolContext::default())
            .await
            .unwrap();
        assert!(out.starts_with("Current Local Time: "));
    }

    #[test]
    fn tool_definition() {
        let def = CurrentTimeTool.to_definition();
        assert_eq!(def.name, "get_current_time");
        assert!(def.input_schema["properties"].as_object().unwrap().is_empty());
    }
}
