use std::sync::atomic::{AtomicU64, Ordering};

use crate::protocol::upstream::encoder::ChatIds;
use crate::util::format_request_seq_hex;

/// Identifiers minted for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIds {
    pub completion_id: String,
    pub chat: ChatIds,
}

pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub(crate) fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.seed ^ u128::from(request_seq))
    }

    #[must_use]
    pub(crate) fn next_ids(&self) -> RequestIds {
        let seq = self.next_seq();
        let chat_id = self.request_uuid(seq);
        let message_id = uuid::Uuid::from_u128(self.seed.rotate_left(64) ^ u128::from(seq));
        #[allow(clippy::cast_possible_truncation)]
        let completion_seq = (self.seed as u64) ^ seq;
        RequestIds {
            completion_id: format_request_seq_hex("chatcmpl-", completion_seq),
            chat: ChatIds {
                chat_id: chat_id.hyphenated().to_string(),
                message_id: message_id.hyphenated().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct() {
        let generator = RequestIdGenerator::new();
        let first = generator.next_ids();
        let second = generator.next_ids();
        assert_ne!(first, second);
        assert_ne!(first.chat.chat_id, first.chat.message_id);
        assert!(first.completion_id.starts_with("chatcmpl-"));
        assert_eq!(first.completion_id.len(), "chatcmpl-".len() + 16);
        assert_eq!(first.chat.chat_id.len(), 36);
    }
}
