//! `{{user}}` / `{{channel}}` substitution for rule texts.

use std::sync::LazyLock;

use regex::Regex;

static USER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{user\}\}").expect("user token regex is valid"));
static CHANNEL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{channel\}\}").expect("channel token regex is valid"));

/// Replace every `{{user}}` and `{{channel}}` token, in any letter case.
///
/// Mentions are inserted literally, so `$` in a mention is not expanded.
pub fn render(text: &str, user_mention: &str, channel_mention: &str) -> String {
    let text = USER_TOKEN.replace_all(text, regex::NoExpand(user_mention));
    CHANNEL_TOKEN
        .replace_all(&text, regex::NoExpand(channel_mention))
        .into_owned()
}
