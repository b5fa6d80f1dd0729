//! 会话标识（ConversationId）
//!
//! 同一对端点之间的往来消息必须归入同一会话：将两个端点按字典序排序后拼接，
//! 取 SHA-256 摘要的前 128 位作为 UUID。收发方向互换时结果逐位一致。
//!
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn conversation_id(a: &str, b: &str) -> Uuid {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut hasher = Sha256::new();
    hasher.update(first.as_bytes());
    hasher.update(second.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_of_direction() {
        let pairs = [
            ("+15550001111", "+15550002222"),
            ("alice@example.com", "+18333450761"),
            ("same", "same"),
            ("", "x"),
        ];
        for (a, b) in pairs {
            assert_eq!(conversation_id(a, b), conversation_id(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn distinct_pairs_differ() {
        assert_ne!(
            conversation_id("+15550001111", "+15550002222"),
            conversation_id("+15550001111", "+15550003333")
        );
    }

    #[test]
    fn stable_known_value() {
        // sha256("+15550001111+15550002222") = 4adf8ccdc10c675f0e8aef7cd3a46260...
        let expected = Uuid::parse_str("4adf8ccd-c10c-675f-0e8a-ef7cd3a46260").unwrap();
        assert_eq!(conversation_id("+15550002222", "+15550001111"), expected);
    }
}
