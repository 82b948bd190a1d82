use veilstream_model::{ParticipantId, RoomId};

/// Role flag carried by every signaling event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Broadcaster,
    Other,
}

/// The raw, already-parsed event kind from the signaling layer. The wire
/// encoding belongs to the collaborator; the core only ever sees this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEventKind {
    BroadcasterTrackPublished,
    BroadcasterLeft,
    RoomFinished,
    /// Any other event kind the signaling layer emits. The core ignores it.
    Other,
}

/// One event from the session/room signaling layer.
#[derive(Debug, Clone, Copy)]
pub struct SignalEvent {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub role: ParticipantRole,
    pub kind: SignalEventKind,
}

/// The three lifecycle transitions the core actually reacts to.
/// Produced by classifying a [`SignalEvent`]; every other combination of
/// role/kind is simply not represented here.
#[derive(Debug, Clone, Copy)]
pub enum SessionLifecycleEvent {
    BroadcasterTrackPublished {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    BroadcasterLeft {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    RoomFinished {
        room_id: RoomId,
    },
}

impl SessionLifecycleEvent {
    /// Classifies a raw signaling event, returning `None` for anything the
    /// core does not act on (non-broadcaster participants, unrelated event
    /// kinds).
    pub fn classify(event: SignalEvent) -> Option<Self> {
        match (event.kind, event.role) {
            (SignalEventKind::BroadcasterTrackPublished, ParticipantRole::Broadcaster) => {
                Some(Self::BroadcasterTrackPublished {
                    room_id: event.room_id,
                    participant_id: event.participant_id,
                })
            }
            (SignalEventKind::BroadcasterLeft, ParticipantRole::Broadcaster) => {
                Some(Self::BroadcasterLeft {
                    room_id: event.room_id,
                    participant_id: event.participant_id,
                })
            }
            (SignalEventKind::RoomFinished, _) => Some(Self::RoomFinished {
                room_id: event.room_id,
            }),
            _ => None,
        }
    }

    pub fn room_id(&self) -> RoomId {
        match self {
            Self::BroadcasterTrackPublished { room_id, .. }
            | Self::BroadcasterLeft { room_id, .. }
            | Self::RoomFinished { room_id } => *room_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(kind: SignalEventKind, role: ParticipantRole) -> SignalEvent {
        SignalEvent {
            room_id: RoomId::from(Uuid::now_v7()),
            participant_id: ParticipantId::from(Uuid::now_v7()),
            role,
            kind,
        }
    }

    #[test]
    fn non_broadcaster_publish_is_ignored() {
        let e = event(SignalEventKind::BroadcasterTrackPublished, ParticipantRole::Other);
        assert!(SessionLifecycleEvent::classify(e).is_none());
    }

    #[test]
    fn room_finished_is_accepted_regardless_of_role() {
        let e = event(SignalEventKind::RoomFinished, ParticipantRole::Other);
        assert!(matches!(
            SessionLifecycleEvent::classify(e),
            Some(SessionLifecycleEvent::RoomFinished { .. })
        ));
    }

    #[test]
    fn unrelated_kind_is_ignored() {
        let e = event(SignalEventKind::Other, ParticipantRole::Broadcaster);
        assert!(SessionLifecycleEvent::classify(e).is_none());
    }
}
