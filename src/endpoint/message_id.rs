use siphasher::sip::SipHasher13;

/// Derives the message id carried in message descriptors.
///
/// The id is a keyed hash of the payload, so two different messages sent by the same station
/// are very unlikely to share an id, and stale acknowledgments for an earlier message can be
/// told apart from current ones.
pub struct MessageIdHasher {
    key: [u8; 16],
}

impl Default for MessageIdHasher {
    fn default() -> Self {
        // Drawn from the thread-local CSPRNG
        Self {
            key: rand::random(),
        }
    }
}

impl MessageIdHasher {
    pub fn with_key(key: [u8; 16]) -> Self {
        Self { key }
    }

    pub fn compute(&self, payload: &[u8], connection_id: u8, sequence: u32) -> u16 {
        use core::hash::Hasher;

        let mut hasher = SipHasher13::new_with_key(&self.key);

        hasher.write_u8(connection_id);
        hasher.write_u32(sequence);
        hasher.write_usize(payload.len());
        hasher.write(payload);

        let hash = hasher.finish();

        // Fold so that every bit of the hash contributes
        (hash ^ (hash >> 16) ^ (hash >> 32) ^ (hash >> 48)) as u16
    }
}
