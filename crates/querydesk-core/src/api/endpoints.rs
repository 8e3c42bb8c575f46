//! Classification of API routes that are reachable without a session.

/// Token refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/public/refresh";

/// Path fragments of endpoints that never carry an access token and never
/// trigger a token refresh when they answer 401.
const PUBLIC_PATHS: [&str; 4] = [
    "/public/login",
    "/public/register",
    "/forgot-password",
    REFRESH_PATH,
];

/// Returns true if the request target is a public endpoint.
pub fn is_public(target: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| target.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_endpoints() {
        assert!(is_public("/public/login"));
        assert!(is_public("/public/register"));
        assert!(is_public("/auth/forgot-password"));
        assert!(is_public("/public/refresh"));
        assert!(is_public("https://desk.example.com/api/public/login?next=/queries"));
    }

    #[test]
    fn test_protected_endpoints() {
        assert!(!is_public("/queries"));
        assert!(!is_public("/admin/users"));
        assert!(!is_public("/profile"));
        assert!(!is_public("/public"));
        assert!(!is_public(""));
    }
}
