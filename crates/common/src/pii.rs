//! PII masking for log output.

/// Mask an email address, keeping the first and last character of the local
/// part and the full domain.
pub fn mask_email(email: &str) -> String {
    let Some((username, domain)) = email.split_once('@') else {
        return email.to_string();
    };
    if username.len() <= 2 {
        let first = username.chars().next().unwrap_or('*');
        return format!("{first}***@{domain}");
    }
    let first = username.chars().next().unwrap_or('*');
    let last = username.chars().last().unwrap_or('*');
    format!("{first}***{last}@{domain}")
}

/// Mask a phone number, keeping the country-code prefix and last two digits.
pub fn mask_phone(phone: &str) -> String {
    if phone.len() < 4 {
        return "***".to_string();
    }
    format!("{}***{}", &phone[..3], &phone[phone.len() - 2..])
}

/// Mask a push device token, keeping a short prefix and suffix.
pub fn mask_device_token(token: &str) -> String {
    if token.len() < 10 {
        return "***".to_string();
    }
    format!("{}***{}", &token[..8], &token[token.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("joana@example.com"), "j***a@example.com");
        assert_eq!(mask_email("ab@example.com"), "a***@example.com");
        assert_eq!(mask_email("not-an-email"), "not-an-email");
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+5511999998888"), "+55***88");
        assert_eq!(mask_phone("123"), "***");
    }

    #[test]
    fn test_mask_device_token() {
        assert_eq!(mask_device_token("abcdefgh1234567890"), "abcdefgh***7890");
        assert_eq!(mask_device_token("short"), "***");
    }
}
