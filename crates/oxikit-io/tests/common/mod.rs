// Shared helpers for oxikit-io integration tests.

#![allow(dead_code)]

use oxikit_io::{ByteOrder, MemorySource, StreamSettings};

/// Every combination of byte order and type-tag mode.
pub const ALL_SETTINGS: [StreamSettings; 4] = [
    StreamSettings {
        byte_order: ByteOrder::Big,
        type_tags: false,
    },
    StreamSettings {
        byte_order: ByteOrder::Big,
        type_tags: true,
    },
    StreamSettings {
        byte_order: ByteOrder::Little,
        type_tags: false,
    },
    StreamSettings {
        byte_order: ByteOrder::Little,
        type_tags: true,
    },
];

/// Creates an empty memory stream with the given settings.
pub fn stream(settings: StreamSettings) -> MemorySource {
    MemorySource::new().with_settings(settings)
}
