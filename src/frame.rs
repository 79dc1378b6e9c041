use std::sync::Arc;
use std::time::SystemTime;

/// A single encoded camera frame.
///
/// The JPEG payload sits behind an `Arc` and is never mutated after
/// construction: the preview loop publishes a new `FrameData` for every grab
/// instead of writing into an existing buffer, so a clone handed to a reader
/// stays intact however often the slot is refreshed afterwards.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Sequence number assigned by the frame source
    pub id: u64,
    /// Wall-clock time the frame was grabbed
    pub timestamp: SystemTime,
    /// JPEG-encoded image
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels, 0 if the stream did not report it
    pub width: u32,
    /// Frame height in pixels, 0 if the stream did not report it
    pub height: u32,
}

impl FrameData {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// JPEG bytes of the frame
    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_immutable_payload() {
        let frame = FrameData::new(7, SystemTime::now(), vec![0xFF, 0xD8, 0xFF, 0xD9], 4, 4);
        let copy = frame.clone();

        assert_eq!(copy.id, 7);
        assert_eq!(copy.bytes(), frame.bytes());
        assert_eq!(copy.len(), 4);
        assert!(!copy.is_empty());
    }
}
