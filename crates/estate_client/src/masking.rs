const VISIBLE_PREFIX: usize = 6;

/// Shortens a secret (token, password) so it can appear in log lines.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(VISIBLE_PREFIX).collect();
    if visible.len() == secret.len() {
        "*".repeat(secret.chars().count())
    } else {
        format!("{visible}…[{} chars]", secret.chars().count())
    }
}
