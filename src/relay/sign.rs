//! Request signing for the translation provider.
//! `sign = md5(appid + q + salt + secret)` as lowercase hex over UTF-8 bytes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_SALT: AtomicU64 = AtomicU64::new(0);

pub fn sign(app_id: &str, text: &str, salt: &str, app_secret: &str) -> String {
    let mut material = String::with_capacity(app_id.len() + text.len() + salt.len() + app_secret.len());
    material.push_str(app_id);
    material.push_str(text);
    material.push_str(salt);
    material.push_str(app_secret);
    format!("{:x}", md5::compute(material.as_bytes()))
}

/// Millisecond-timestamp nonce, bumped when two requests land in the same millisecond.
pub fn make_salt() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let mut last = LAST_SALT.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_SALT.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next.to_string(),
            Err(current) => last = current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_vector() {
        assert_eq!(sign("A", "hi", "1", "B"), "b377dc2d20265ab9d14f62fe80311bd2");
    }

    #[test]
    fn provider_documentation_vector() {
        assert_eq!(
            sign("2015063000000001", "apple", "1435660288", "12345678"),
            "f89f9594663708c1605f3d736d01d2d4"
        );
    }

    #[test]
    fn signs_utf8_bytes() {
        assert_eq!(sign("A", "你好", "1", "B"), "88f8868b57f5c28bd1b2e1b48c0fe54d");
    }

    #[test]
    fn salts_are_unique_and_increasing() {
        let salts: Vec<u64> = (0..100).map(|_| make_salt().parse().unwrap()).collect();
        assert!(salts.windows(2).all(|w| w[1] > w[0]));
    }
}
