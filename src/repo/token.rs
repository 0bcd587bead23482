//! Token-based HTTPS authentication for clone/fetch URLs (§6).
//!
//! SSH URLs are rewritten to HTTPS before a token is injected; per-host
//! environment variables take precedence over the generic `GIT_TOKEN`
//! fallback.

const HOST_ENV_VARS: &[(&str, &str)] = &[
    ("github.com", "GITHUB_TOKEN"),
    ("gitlab.com", "GITLAB_TOKEN"),
    ("bitbucket.org", "BITBUCKET_TOKEN"),
    ("gitee.com", "GITEE_TOKEN"),
];

/// Rewrites `git@host:owner/repo(.git)` and `ssh://git@host/owner/repo` forms
/// to `https://host/owner/repo(.git)`. Already-HTTPS URLs pass through
/// unchanged.
pub fn ssh_to_https(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("ssh://git@") {
        return format!("https://{rest}");
    }
    if let Some(rest) = url.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            return format!("https://{host}/{path}");
        }
    }
    url.to_string()
}

fn token_env_var_for_host(host: &str) -> Option<&'static str> {
    HOST_ENV_VARS
        .iter()
        .find(|(h, _)| host == *h || host.ends_with(&format!(".{h}")))
        .map(|(_, var)| *var)
}

fn lookup_token(host: &str, env: &dyn Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(var) = token_env_var_for_host(host) {
        if let Some(tok) = env(var) {
            return Some(tok);
        }
    }
    env("GIT_TOKEN")
}

/// Returns `url` rewritten to HTTPS with a bearer token embedded as
/// userinfo (`https://<token>@host/path`), or the SSH-normalized URL
/// unchanged if no token is configured for its host.
pub fn authenticated_url(url: &str, env: impl Fn(&str) -> Option<String>) -> String {
    let https_url = ssh_to_https(url);
    let Some(rest) = https_url.strip_prefix("https://") else {
        return https_url;
    };
    let host = rest.split('/').next().unwrap_or_default();
    match lookup_token(host, &env) {
        Some(token) if !token.is_empty() => format!("https://{token}@{rest}"),
        _ => https_url,
    }
}

pub fn authenticated_url_from_env(url: &str) -> String {
    authenticated_url(url, |key| std::env::var(key).ok())
}
