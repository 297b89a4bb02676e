//! Reconstruction of a record's life cycle from its audit entries.

use serde_json::{Map, Value};

use super::{AuditAction, MOVEMENT_ID_KEY};

/// One audit entry, reduced to what replay needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// What happened.
    pub action: AuditAction,
    /// Snapshot before the action, if the row existed.
    pub before: Option<Value>,
    /// Snapshot (possibly partial) after the action.
    pub after: Option<Value>,
}

/// Replays events in ascending order and returns the record's last known state.
///
/// `after` snapshots are merged key by key over the running state, so partial
/// snapshots such as a soft delete's `{"active": false}` only touch the keys
/// they carry. References to other rows, such as the movement id of a stock
/// movement, are not merged. Returns `None` when no event carried an object snapshot.
pub fn replay<'a, I>(events: I) -> Option<Value>
where
    I: IntoIterator<Item = &'a AuditEvent>,
{
    let mut state: Option<Map<String, Value>> = None;

    for event in events {
        let Some(Value::Object(after)) = &event.after else {
            continue;
        };

        let current = state.get_or_insert_with(|| match &event.before {
            Some(Value::Object(before)) => before.clone(),
            _ => Map::new(),
        });
        for (key, value) in after {
            if key == MOVEMENT_ID_KEY {
                continue;
            }
            current.insert(key.clone(), value.clone());
        }
    }

    state.map(Value::Object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(action: AuditAction, before: Option<Value>, after: Option<Value>) -> AuditEvent {
        AuditEvent {
            action,
            before,
            after,
        }
    }

    #[test]
    fn test_replay_full_life_cycle() {
        let created = json!({"id": 1, "name": "Ink", "quantity": 0, "active": true});
        let moved = json!({"id": 1, "name": "Ink", "quantity": 10, "active": true});
        let events = vec![
            event(AuditAction::Create, None, Some(created.clone())),
            event(AuditAction::StockMovement, Some(created), Some(moved.clone())),
            event(
                AuditAction::SoftDelete,
                Some(moved),
                Some(json!({"active": false})),
            ),
        ];

        let state = replay(&events).unwrap();
        assert_eq!(state["quantity"], json!(10));
        assert_eq!(state["active"], json!(false));
        assert_eq!(state["name"], json!("Ink"));
    }

    #[test]
    fn test_replay_starts_from_before_when_history_is_partial() {
        // Rows that predate the audit log have no CREATE entry.
        let events = vec![event(
            AuditAction::SoftDelete,
            Some(json!({"id": 7, "active": true, "name": "Legacy"})),
            Some(json!({"active": false})),
        )];

        let state = replay(&events).unwrap();
        assert_eq!(state, json!({"id": 7, "active": false, "name": "Legacy"}));
    }

    #[test]
    fn test_replay_skips_movement_reference() {
        let created = json!({"id": 3, "quantity": 0});
        let events = vec![
            event(AuditAction::Create, None, Some(created.clone())),
            event(
                AuditAction::StockMovement,
                Some(created),
                Some(json!({"id": 3, "quantity": 4, "movement_id": 17})),
            ),
        ];

        let state = replay(&events).unwrap();
        assert_eq!(state, json!({"id": 3, "quantity": 4}));
    }

    #[test]
    fn test_replay_empty() {
        assert!(replay(&[]).is_none());
        assert!(replay(&[event(AuditAction::Update, None, None)]).is_none());
    }
}
