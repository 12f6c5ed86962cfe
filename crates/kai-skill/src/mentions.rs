// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolution of `@name` strings to chat user ids.

use kai_core::types::MentionedUser;

/// Finds the mentioned user a requested name refers to.
///
/// A leading `@` is ignored. Names match case-insensitively when either one
/// contains the other; the id matches when it contains the requested string.
pub fn resolve_one<'a>(requested: &str, mentioned: &'a [MentionedUser]) -> Option<&'a MentionedUser> {
    let wanted = requested.trim().trim_start_matches('@').trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    mentioned.iter().find(|user| {
        let name = user.name.trim().to_lowercase();
        let name_match = !name.is_empty() && (name.contains(&wanted) || wanted.contains(&name));
        name_match || user.id.to_lowercase().contains(&wanted)
    })
}

/// Resolves requested names to user ids.
///
/// Unmatched names are dropped and duplicates removed, keeping first-seen
/// order. When nothing resolves the result is `[acting_user_id]`.
pub fn resolve_mentions(
    requested: &[String],
    mentioned: &[MentionedUser],
    acting_user_id: &str,
) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for name in requested {
        if let Some(user) = resolve_one(name, mentioned)
            && !ids.contains(&user.id)
        {
            ids.push(user.id.clone());
        }
    }
    if ids.is_empty() {
        ids.push(acting_user_id.to_string());
    }
    ids
}
