use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::QuerySignature;
use crate::models::Landmark;

/// Image file magic bytes
const IMAGE_MAGIC: &[u8; 4] = b"LMIM";
/// Current image file format version
const IMAGE_VERSION: u8 = 1;
/// magic + version + fetched_at + id_len
const IMAGE_HEADER_LEN: usize = 4 + 1 + 8 + 4;

/// Cached result of one query signature. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub signature: QuerySignature,
    pub landmarks: Vec<Landmark>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(signature: QuerySignature, landmarks: Vec<Landmark>, ttl: Duration) -> Self {
        Self {
            signature,
            landmarks,
            fetched_at: Utc::now(),
            ttl_secs: ttl.num_seconds().max(0) as u64,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_secs as i64)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    pub fn age_minutes(&self) -> i64 {
        self.age().num_minutes()
    }

    pub fn age_display(&self) -> String {
        format_age(self.age_minutes())
    }

    /// `now - fetched_at < ttl`
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < self.ttl()
    }
}

/// Cached image payload, stored apart from landmark metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlob {
    pub image_id: String,
    pub bytes: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl ImageBlob {
    pub fn new(image_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            image_id: image_id.into(),
            bytes,
            // Stored at millisecond precision; truncate so a decoded blob compares equal.
            fetched_at: Utc
                .timestamp_millis_opt(Utc::now().timestamp_millis())
                .single()
                .unwrap_or_else(Utc::now),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.fetched_at >= ttl
    }

    /// Serialize to the on-disk format.
    ///
    /// ```text
    /// magic (4 bytes): "LMIM"
    /// version (1 byte): 1
    /// fetched_at (8 bytes): milliseconds since epoch, little endian
    /// id_len (4 bytes): little endian
    /// id (id_len bytes): UTF-8
    /// payload (rest)
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let id = self.image_id.as_bytes();
        let mut out = Vec::with_capacity(IMAGE_HEADER_LEN + id.len() + self.bytes.len());
        out.extend_from_slice(IMAGE_MAGIC);
        out.push(IMAGE_VERSION);
        out.extend_from_slice(&self.fetched_at.timestamp_millis().to_le_bytes());
        out.extend_from_slice(&(id.len() as u32).to_le_bytes());
        out.extend_from_slice(id);
        out.extend_from_slice(&self.bytes);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, String> {
        if data.len() < IMAGE_HEADER_LEN {
            return Err("File too short".into());
        }
        if &data[0..4] != IMAGE_MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if data[4] != IMAGE_VERSION {
            return Err(format!("Unsupported image format version {}", data[4]));
        }

        let mut millis = [0u8; 8];
        millis.copy_from_slice(&data[5..13]);
        let mut id_len = [0u8; 4];
        id_len.copy_from_slice(&data[13..17]);
        let id_len = u32::from_le_bytes(id_len) as usize;

        let id_end = IMAGE_HEADER_LEN
            .checked_add(id_len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| "Image id length exceeds file size".to_string())?;
        let image_id = String::from_utf8(data[IMAGE_HEADER_LEN..id_end].to_vec())
            .map_err(|e| format!("Image id is not UTF-8: {}", e))?;

        let fetched_at = Utc
            .timestamp_millis_opt(i64::from_le_bytes(millis))
            .single()
            .ok_or_else(|| "Invalid timestamp".to_string())?;

        Ok(Self {
            image_id,
            bytes: data[id_end..].to_vec(),
            fetched_at,
        })
    }
}

/// Human-readable age: "just now", "5m ago", "2h ago", "3d ago".
pub fn format_age(minutes: i64) -> String {
    if minutes < 1 {
        // Covers clock skew (negative ages) too
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            // Round up: 1h 30m+ becomes 2h
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            // Round up: 1d 12h+ becomes 2d
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
