use super::{Trigger, TriggerRegistry, TriggerResult};

/// `/help`, `/clear`, and in development builds `/fail`.
pub fn builtin_registry(dev_mode: bool, user_role: Option<String>) -> TriggerRegistry {
    let mut registry = TriggerRegistry::new(dev_mode, user_role);
    registry.register(help());
    registry.register(clear());
    registry.register(fail());
    registry
}

fn help() -> Trigger {
    Trigger::from_fn("help", "List available commands", |ctx| {
        let mut lines = vec!["Available commands:".to_string()];
        lines.extend(
            ctx.commands
                .iter()
                .map(|summary| format!("/{} - {}", summary.command, summary.description)),
        );
        Ok(TriggerResult::respond(lines.join("\n")))
    })
}

fn clear() -> Trigger {
    Trigger::from_fn("clear", "Clear the visible conversation", |_| {
        Ok(TriggerResult {
            handled: true,
            prevent_default: true,
            clear_history: true,
            notice: Some("Conversation cleared".to_string()),
            ..TriggerResult::default()
        })
    })
}

fn fail() -> Trigger {
    Trigger::from_fn("fail", "Force the failed-send path", |_| {
        Ok(TriggerResult {
            handled: true,
            simulate_failure: true,
            ..TriggerResult::default()
        })
    })
    .dev_only()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_help_lists_public_commands_only() {
        let registry = builtin_registry(true, None);
        let result = registry.execute_trigger("/help").await.unwrap();
        let response = result.response.unwrap();
        assert!(response.contains("/help - List available commands"));
        assert!(response.contains("/clear - Clear the visible conversation"));
        assert!(!response.contains("/fail"));
        assert!(result.prevent_default);
    }

    #[tokio::test]
    async fn test_clear_requests_history_reset_with_notice() {
        let registry = builtin_registry(false, None);
        let result = registry.execute_trigger("/clear").await.unwrap();
        assert!(result.clear_history);
        assert_eq!(result.notice.as_deref(), Some("Conversation cleared"));
        assert_eq!(result.response, None);
    }

    #[tokio::test]
    async fn test_fail_exists_only_in_dev_mode() {
        let production = builtin_registry(false, None);
        assert_eq!(production.execute_trigger("/fail").await, None);

        let development = builtin_registry(true, None);
        let result = development.execute_trigger("/fail").await.unwrap();
        assert!(result.simulate_failure);
        assert!(!result.prevent_default);
    }
}
