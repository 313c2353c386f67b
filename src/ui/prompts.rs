//! Prompts that fall back to defaults when nobody is at the terminal

use super::context::UiContext;
use crate::error::{JusimError, JusimResult};

/// Yes/no question; `default` when non-interactive, yes under `--yes`
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> JusimResult<bool> {
    if ctx.auto_yes() {
        println!("  {} (auto-approved)", message);
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message).initial_value(default).interact()
    })
    .await
    .map_err(|e| JusimError::User(format!("Prompt task failed: {}", e)))?;

    result.map_err(|e| JusimError::User(format!("Prompt failed: {}", e)))
}

/// Pick any number of items, pre-checking `initial`.
///
/// Non-interactive contexts get `initial` back unchanged.
pub async fn multiselect(
    ctx: &UiContext,
    message: &str,
    items: &[(String, String)], // (value, hint)
    initial: &[String],
) -> JusimResult<Vec<String>> {
    if !ctx.is_interactive() {
        return Ok(initial.to_vec());
    }

    let message = message.to_string();
    let items = items.to_vec();
    let initial = initial.to_vec();
    let result = tokio::task::spawn_blocking(move || {
        let mut prompt = cliclack::multiselect(&message)
            .initial_values(initial)
            .required(false);
        for (value, hint) in items {
            prompt = prompt.item(value.clone(), value, hint);
        }
        prompt.interact()
    })
    .await
    .map_err(|e| JusimError::User(format!("Prompt task failed: {}", e)))?;

    result.map_err(|e| JusimError::User(format!("Selection failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirm_auto_yes() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Remove?", false).await.unwrap());
    }

    #[tokio::test]
    async fn confirm_non_interactive_default() {
        let ctx = UiContext::non_interactive();
        assert!(confirm(&ctx, "Remove?", true).await.unwrap());
        assert!(!confirm(&ctx, "Remove?", false).await.unwrap());
    }

    #[tokio::test]
    async fn multiselect_non_interactive_keeps_initial() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        let items = vec![
            ("A".to_string(), String::new()),
            ("B".to_string(), "added".to_string()),
        ];
        let initial = vec!["B".to_string()];
        assert_eq!(multiselect(&ctx, "Packages", &items, &initial).await.unwrap(), initial);
    }
}
