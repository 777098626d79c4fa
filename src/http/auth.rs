use rouille::Request;

pub const SESSION_COOKIE: &str = "session";

/// Session token from `Authorization: Bearer <token>` or the `session` cookie
pub fn session_token(request: &Request) -> Option<String> {
    let bearer = request
        .header("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    rouille::input::cookies(request)
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|token| !token.is_empty())
}
