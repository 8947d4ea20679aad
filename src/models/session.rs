use std::collections::HashMap;

use serde::Deserialize;

/// 一个账号的登录凭据
#[derive(Clone, Deserialize)]
pub struct Credential {
    /// 账号标识（邮箱等），同时作为会话 ID
    pub label: String,
    /// 登录后得到的 cookie
    #[serde(default)]
    pub cookies: HashMap<String, String>,
}

impl Credential {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cookies: HashMap::new(),
        }
    }
}

// cookie 值不进日志
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.cookies.keys().collect();
        names.sort();
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("cookies", &names)
            .finish()
    }
}

/// 打开一个会话所需的信息
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub session_id: String,
    pub credential: Credential,
    /// 打开前注入的 cookie（凭据自带的 + 缓存的 clearance）
    pub seed_cookies: HashMap<String, String>,
    pub target_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_cookie_values() {
        let mut credential = Credential::new("a@example.com");
        credential
            .cookies
            .insert("sso".to_string(), "secret-token".to_string());
        let printed = format!("{:?}", credential);
        assert!(printed.contains("sso"));
        assert!(!printed.contains("secret-token"));
    }
}
