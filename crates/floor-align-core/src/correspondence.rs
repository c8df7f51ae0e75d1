//! Manual local/global matches and the contract of the external resolver
//! that turns them into a room alignment.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::floor::FloorAlignment;
use crate::store::{self, AlignmentStoreError};
use crate::transform::RigidTransform;

/// Minimal number of matches accepted by a resolver.
pub const MIN_CORRESPONDENCES: usize = 3;

/// A scene node picked by the user, in either the room or the floor frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 3]>,
    /// Bounding-box extents of the node, used to suggest likely matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<[f64; 3]>,
}

impl NodeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: None,
            dimensions: None,
        }
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_dimensions(mut self, dimensions: [f64; 3]) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// One matched pair: a node of the room scan and the same feature on the floor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub local: NodeRef,
    pub global: NodeRef,
}

impl Correspondence {
    pub fn new(local: NodeRef, global: NodeRef) -> Self {
        Self { local, global }
    }
}

/// Matches accumulated for one room during a matching round.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrespondenceSet {
    pairs: Vec<Correspondence>,
}

impl CorrespondenceSet {
    pub fn push(&mut self, pair: Correspondence) {
        self.pairs.push(pair);
    }

    pub fn pairs(&self) -> &[Correspondence] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.pairs.len() >= MIN_CORRESPONDENCES
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

/// Request handed to a [`Resolver`].
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ResolveRequest<'a> {
    pub floor: &'a str,
    pub room: &'a str,
    pub pairs: &'a [Correspondence],
}

#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
    #[error("resolver rejected the request: {0}")]
    Rejected(String),
    #[error("malformed resolver response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("resolver response has no entry for room {0:?}")]
    MissingRoom(String),
}

/// Estimates a room alignment from matched points. Implementations usually
/// call a remote service and may block for the duration of the round trip.
pub trait Resolver {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<RigidTransform, ResolverError>;
}

/// Success payload of a resolver: either one `{translation, R_Y}` entry or
/// an alignment-file-shaped object keyed by room name.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResolverResponse {
    Entry(RigidTransform),
    Keyed(BTreeMap<String, RigidTransform>),
}

impl ResolverResponse {
    pub fn from_json(raw: &str) -> Result<Self, ResolverError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn into_transform(self, room: &str) -> Result<RigidTransform, ResolverError> {
        match self {
            ResolverResponse::Entry(t) => Ok(t),
            ResolverResponse::Keyed(mut rooms) => rooms
                .remove(room)
                .ok_or_else(|| ResolverError::MissingRoom(room.to_string())),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("room {room:?} has {found} correspondences, at least {required} are required")]
    InsufficientCorrespondences {
        room: String,
        found: usize,
        required: usize,
    },
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Store(#[from] AlignmentStoreError),
}

/// Per-floor working state of the matching workflow. Not persisted.
#[derive(Clone, Debug, Default)]
pub struct AlignmentSession {
    pending: BTreeMap<String, CorrespondenceSet>,
}

impl AlignmentSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a match for `room`; returns how many the room now has.
    pub fn add(&mut self, room: &str, pair: Correspondence) -> usize {
        let set = self.pending.entry(room.to_string()).or_default();
        set.push(pair);
        debug!("{room}: {} correspondences", set.len());
        set.len()
    }

    pub fn pending(&self, room: &str) -> Option<&CorrespondenceSet> {
        self.pending.get(room)
    }

    pub fn discard(&mut self, room: &str) {
        self.pending.remove(room);
    }

    /// Submit the matches of `room` to `resolver` and store the result.
    ///
    /// Fewer than [`MIN_CORRESPONDENCES`] matches are rejected before the
    /// resolver is called. On success the alignment is set in the floor's
    /// table (memory only) and the matches are dropped; on failure they are
    /// kept so the round can be retried.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(self, floor, resolver), fields(floor = floor.name())))]
    pub fn submit<R>(
        &mut self,
        room: &str,
        floor: &mut FloorAlignment,
        resolver: &R,
    ) -> Result<RigidTransform, SessionError>
    where
        R: Resolver + ?Sized,
    {
        let found = self.pending.get(room).map_or(0, CorrespondenceSet::len);
        if found < MIN_CORRESPONDENCES {
            return Err(SessionError::InsufficientCorrespondences {
                room: room.to_string(),
                found,
                required: MIN_CORRESPONDENCES,
            });
        }
        let pairs = self.pending.get(room).map(CorrespondenceSet::pairs).unwrap_or(&[]);

        let request = ResolveRequest {
            floor: floor.name(),
            room,
            pairs,
        };
        let transform = match resolver.resolve(&request) {
            Ok(t) => t,
            Err(e) => {
                warn!("resolver failed for {room}, keeping {found} correspondences: {e}");
                return Err(e.into());
            }
        };

        floor.store_mut().set(room, transform);
        self.pending.remove(room);
        info!("{room} aligned from {found} correspondences");
        Ok(transform)
    }

    /// [`submit`](Self::submit), then write just this room's entry to the
    /// floor's file.
    pub fn submit_and_persist<R>(
        &mut self,
        room: &str,
        floor: &mut FloorAlignment,
        resolver: &R,
    ) -> Result<RigidTransform, SessionError>
    where
        R: Resolver + ?Sized,
    {
        let transform = self.submit(room, floor, resolver)?;
        store::update_entry(floor.file_path(), room, &transform)?;
        Ok(transform)
    }
}

/// Order `candidates` by how closely their dimensions match `local`'s.
///
/// Candidates without dimensions, or any when `local` has none, keep their
/// relative order after the ranked ones.
pub fn rank_by_similarity<'a>(local: &NodeRef, candidates: &'a [NodeRef]) -> Vec<&'a NodeRef> {
    let distance = |c: &NodeRef| -> Option<f64> {
        let [a0, a1, a2] = local.dimensions?;
        let [b0, b1, b2] = c.dimensions?;
        Some(((a0 - b0).powi(2) + (a1 - b1).powi(2) + (a2 - b2).powi(2)).sqrt())
    };
    let mut ranked: Vec<(&NodeRef, Option<f64>)> =
        candidates.iter().map(|c| (c, distance(c))).collect();
    ranked.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    ranked.into_iter().map(|(c, _)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AlignmentStore;
    use nalgebra::Vector3;
    use std::cell::RefCell;

    /// Replies with a fixed result and records what it was asked.
    struct ScriptedResolver {
        reply: Result<RigidTransform, String>,
        seen: RefCell<Vec<(String, String, usize)>>,
    }

    impl ScriptedResolver {
        fn ok(t: RigidTransform) -> Self {
            Self {
                reply: Ok(t),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(msg: &str) -> Self {
            Self {
                reply: Err(msg.to_string()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Resolver for ScriptedResolver {
        fn resolve(&self, request: &ResolveRequest<'_>) -> Result<RigidTransform, ResolverError> {
            self.seen.borrow_mut().push((
                request.floor.to_string(),
                request.room.to_string(),
                request.pairs.len(),
            ));
            match &self.reply {
                Ok(t) => Ok(*t),
                Err(msg) => Err(ResolverError::Unavailable(msg.clone())),
            }
        }
    }

    fn pair(i: usize) -> Correspondence {
        Correspondence::new(
            NodeRef::new(format!("Wall{i}")),
            NodeRef::new(format!("Wall{}", i + 10)),
        )
    }

    fn floor() -> FloorAlignment {
        FloorAlignment::new("Ground", "Ground.json", AlignmentStore::new())
    }

    #[test]
    fn two_matches_are_rejected_before_resolving() {
        let resolver = ScriptedResolver::ok(RigidTransform::IDENTITY);
        let mut session = AlignmentSession::new();
        session.add("Kitchen", pair(0));
        session.add("Kitchen", pair(1));
        let mut floor = floor();

        let err = session.submit("Kitchen", &mut floor, &resolver).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InsufficientCorrespondences {
                found: 2,
                required: 3,
                ..
            }
        ));
        assert!(resolver.seen.borrow().is_empty());
        assert_eq!(session.pending("Kitchen").map(CorrespondenceSet::len), Some(2));
    }

    #[test]
    fn unknown_room_counts_as_zero_matches() {
        let resolver = ScriptedResolver::ok(RigidTransform::IDENTITY);
        let mut session = AlignmentSession::new();
        let err = session.submit("Attic", &mut floor(), &resolver).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InsufficientCorrespondences { found: 0, .. }
        ));
    }

    #[test]
    fn success_sets_transform_and_clears_matches() {
        let expected = RigidTransform::from_translation(Vector3::new(2.0, 0.0, -1.0)).expect("rigid");
        let resolver = ScriptedResolver::ok(expected);
        let mut session = AlignmentSession::new();
        for i in 0..3 {
            session.add("Kitchen", pair(i));
        }
        let mut floor = floor();
        let t = session.submit("Kitchen", &mut floor, &resolver).expect("submit");
        assert_eq!(t, expected);
        assert_eq!(floor.store().get("Kitchen"), expected);
        assert!(session.pending("Kitchen").is_none());
        assert_eq!(
            resolver.seen.borrow().as_slice(),
            &[("Ground".to_string(), "Kitchen".to_string(), 3)]
        );
    }

    #[test]
    fn failure_keeps_matches_for_retry() {
        let resolver = ScriptedResolver::failing("timeout");
        let mut session = AlignmentSession::new();
        for i in 0..4 {
            session.add("Kitchen", pair(i));
        }
        let mut floor = floor();
        let err = session.submit("Kitchen", &mut floor, &resolver).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Resolver(ResolverError::Unavailable(_))
        ));
        assert_eq!(session.pending("Kitchen").map(CorrespondenceSet::len), Some(4));
        assert!(!floor.store().contains("Kitchen"));

        let retry = ScriptedResolver::ok(RigidTransform::from_yaw(0.25).expect("rigid"));
        session.submit("Kitchen", &mut floor, &retry).expect("retry");
        assert!(floor.store().contains("Kitchen"));
    }

    #[test]
    fn response_payload_shapes() {
        let entry = r#"{
            "translation": [[1,0,0,2],[0,1,0,0],[0,0,1,-1],[0,0,0,1]],
            "R_Y": [[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]]
        }"#;
        let t = ResolverResponse::from_json(entry)
            .and_then(|r| r.into_transform("Kitchen"))
            .expect("entry");
        assert_eq!(t.translation_vector(), Vector3::new(2.0, 0.0, -1.0));

        let keyed = format!(r#"{{"Kitchen": {entry}}}"#);
        let response = ResolverResponse::from_json(&keyed).expect("keyed");
        assert!(matches!(
            response.clone().into_transform("Bath"),
            Err(ResolverError::MissingRoom(_))
        ));
        assert_eq!(response.into_transform("Kitchen").expect("kitchen"), t);

        assert!(matches!(
            ResolverResponse::from_json(r#"{"error": "degenerate points"}"#),
            Err(ResolverError::MalformedResponse(_))
        ));
    }

    #[test]
    fn ranks_candidates_by_dimension_distance() {
        let local = NodeRef::new("Door0").with_dimensions([0.9, 2.0, 0.1]);
        let candidates = vec![
            NodeRef::new("Wall3").with_dimensions([4.0, 2.5, 0.1]),
            NodeRef::new("Unknown"),
            NodeRef::new("Door7").with_dimensions([0.85, 2.0, 0.1]),
            NodeRef::new("Window1").with_dimensions([1.2, 1.0, 0.1]),
        ];
        let ids: Vec<&str> = rank_by_similarity(&local, &candidates)
            .into_iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["Door7", "Window1", "Wall3", "Unknown"]);
    }
}
