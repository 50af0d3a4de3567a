//! Multipart upload sessions and parts.
//!
//! The driver keeps no state for an open upload; the provider-issued upload
//! id is the caller's only handle and must be echoed on every call.

use serde::{Deserialize, Serialize};

/// A multipart upload opened by `create_multipart_upload`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MultipartUpload {
    /// Disk-relative path of the object being assembled.
    pub path: String,

    /// Opaque upload id issued by the provider.
    pub upload_id: String,
}

/// A committed chunk of a multipart upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadedPart {
    /// Part number (1-based, caller assigned, unique per upload).
    pub part_number: i32,

    /// ETag returned by the provider for this part.
    pub tag: String,
}

/// Order parts by part number as the provider requires on completion.
///
/// Parts may finish in any order under concurrent upload; this is the only
/// ordering the layer guarantees.
pub fn sort_parts(mut parts: Vec<UploadedPart>) -> Vec<UploadedPart> {
    parts.sort_by_key(|p| p.part_number);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_parts_orders_by_part_number() {
        let parts = vec![
            UploadedPart { part_number: 3, tag: "c".into() },
            UploadedPart { part_number: 1, tag: "a".into() },
            UploadedPart { part_number: 7, tag: "d".into() },
            UploadedPart { part_number: 2, tag: "b".into() },
        ];
        let numbers: Vec<i32> = sort_parts(parts).iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 7]);
    }
}
