//! WhatsApp identity (JID) helpers.
//!
//! A JID looks like `user[:device]@server`. Users live on `s.whatsapp.net`,
//! groups on `g.us`, and status posts arrive from `status@broadcast`.

pub const USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// `true` when the identity names a group conversation.
pub fn is_group(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

/// The user part of a JID with any `:device` suffix removed.
///
/// `"94752978237:12@s.whatsapp.net"` → `"94752978237"`.
pub fn user_part(jid: &str) -> &str {
    let user = jid.split('@').next().unwrap_or("");
    user.split(':').next().unwrap_or("")
}

/// Strip the device suffix so the same account always compares equal.
///
/// Strings without an `@` are returned unchanged.
pub fn normalize(jid: &str) -> String {
    match jid.split_once('@') {
        Some((user, server)) => {
            let user = user.split(':').next().unwrap_or(user);
            format!("{user}@{server}")
        }
        None => jid.to_string(),
    }
}

/// A usable identity: non-empty user part and a server part.
pub fn is_well_formed(jid: &str) -> bool {
    match jid.split_once('@') {
        Some((user, server)) => !user.is_empty() && !server.is_empty(),
        None => false,
    }
}

/// `true` when two identities refer to the same account, ignoring device suffixes.
pub fn same_user(a: &str, b: &str) -> bool {
    let (ua, ub) = (user_part(a), user_part(b));
    !ua.is_empty() && ua == ub
}

/// Build a user JID from a phone number in any formatting (`+94 75-297…`).
pub fn from_number(number: &str) -> Option<String> {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("{digits}@{USER_SERVER}"))
    }
}
