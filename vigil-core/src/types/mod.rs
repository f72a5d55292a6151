//! Domain types shared by the daemon and the CLI.

pub mod cluster;
pub mod history;
pub mod nextcloud;
pub mod push;
pub mod snapshot;

pub use cluster::{
    ClusterData, ClusterStats, ClusterStatus, GuestKind, GuestSummary, HostError, NodeSummary,
    StorageSummary,
};
pub use history::{HistoryRecord, NodeHistoryRecord, SourceKind};
pub use nextcloud::NextcloudSummary;
pub use push::{ClientMessage, ServerMessage};
pub use snapshot::{Snapshot, SourceReport};

use serde_json::Value;

/// Strip the `{ "data": ... }` envelope some upstream APIs wrap their payload in.
pub fn unwrap_payload(value: &Value) -> &Value {
    match value.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_payload() {
        let wrapped = json!({"data": {"nodes": []}, "last_update": null});
        assert_eq!(unwrap_payload(&wrapped), &json!({"nodes": []}));

        let bare = json!({"nodes": []});
        assert_eq!(unwrap_payload(&bare), &bare);

        // A non-object `data` field is part of the payload itself
        let list = json!({"data": [1, 2]});
        assert_eq!(unwrap_payload(&list), &list);
    }
}
