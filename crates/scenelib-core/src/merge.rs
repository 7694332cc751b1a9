//! Folding a normalized source graph into a live destination graph.
//!
//! A merge runs in four steps over a scratch copy of the destination:
//!
//! 1. decide, per source row, whether it lands on an existing destination
//!    row or becomes a new one ([`MergePolicy`]);
//! 2. allocate final ids for new rows from the destination allocators;
//! 3. rewrite every reference of every source row to final ids;
//! 4. commit the rows, validate the scratch graph, and swap it in.
//!
//! Any error leaves the destination untouched.

use crate::error::{Result, StoreError};
use crate::graph::EntityGraph;
use crate::kind::{EntityKind, Id};
use crate::model::{
    Audio, CaptionScript, Clip, LibrarySource, Overlay, Playlist, Scene, SceneGrid, SceneGroup,
    Tag,
};
use crate::table::Entity;
use crate::validate::validate;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// How incoming rows are matched against existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Reuse a destination row only when it has the same id and identical
    /// content. Used for scene import and backup restore.
    #[default]
    ExactEquality,
    /// Match tags by name, clips by `(start, end)`, and sources, audio, and
    /// scripts by url. Library sources are unioned into their match.
    /// Kinds without a business key fall back to exact equality.
    BusinessKey,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExactEquality => "exact_equality",
            Self::BusinessKey => "business_key",
        })
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "exact" | "exact_equality" => Ok(Self::ExactEquality),
            "key" | "business_key" => Ok(Self::BusinessKey),
            other => Err(format!(
                "unknown merge policy: {} (expected exact or key)",
                other
            )),
        }
    }
}

/// Source id to final destination id, per kind.
///
/// Every row of the source graph has an entry after a successful merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMapping {
    kinds: BTreeMap<EntityKind, BTreeMap<Id, Id>>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final id of source row `(kind, source_id)`.
    pub fn get(&self, kind: EntityKind, source_id: Id) -> Option<Id> {
        self.kinds.get(&kind)?.get(&source_id).copied()
    }

    /// The whole mapping for one kind, if any row of that kind was merged.
    pub fn kind(&self, kind: EntityKind) -> Option<&BTreeMap<Id, Id>> {
        self.kinds.get(&kind)
    }

    pub fn insert(&mut self, kind: EntityKind, source_id: Id, final_id: Id) {
        self.kinds.entry(kind).or_default().insert(source_id, final_id);
    }

    /// Total number of mapped rows.
    pub fn len(&self) -> usize {
        self.kinds.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, Id, Id)> + '_ {
        self.kinds
            .iter()
            .flat_map(|(&kind, ids)| ids.iter().map(move |(&from, &to)| (kind, from, to)))
    }
}

#[derive(Debug, Default)]
struct Counts {
    inserted: usize,
    matched: usize,
}

/// Per-row outcome of the matching step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    /// Lands on this destination row.
    Existing(Id),
    /// Becomes a new destination row.
    Insert,
    /// Same business key as an earlier source row of this merge, which is
    /// being inserted; shares its final id.
    Alias(Id),
}

/// Where a source row ends up once aliases are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Landing {
    /// This destination row.
    Existing(Id),
    /// The new row created for this source row.
    Inserted(Id),
}

/// Where a clip's business key is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ClipScope {
    /// Clips of this destination library source.
    Existing(Id),
    /// Clips of this newly inserted source library source.
    New(Id),
    /// No owning source in the incoming graph; the whole clip table.
    Unowned,
}

#[derive(Debug, Default)]
struct Plan {
    decisions: BTreeMap<EntityKind, BTreeMap<Id, Decision>>,
    /// `Existing` decisions reached by exact equality, still subject to the
    /// reference check in [`Plan::confirm`].
    tentative: BTreeSet<(EntityKind, Id)>,
}

impl Plan {
    fn decide(&mut self, kind: EntityKind, id: Id, decision: Decision) {
        self.decisions.entry(kind).or_default().insert(id, decision);
    }

    fn decision(&self, kind: EntityKind, id: Id) -> Option<Decision> {
        self.decisions.get(&kind)?.get(&id).copied()
    }

    fn landing(&self, kind: EntityKind, id: Id) -> Option<Landing> {
        match self.decision(kind, id)? {
            Decision::Existing(dest_id) => Some(Landing::Existing(dest_id)),
            Decision::Insert => Some(Landing::Inserted(id)),
            Decision::Alias(first) => self.landing(kind, first),
        }
    }

    fn match_exact<T: Entity>(&mut self, dest: &EntityGraph, source: &EntityGraph) {
        let existing = T::table(dest);
        for row in T::table(source).iter() {
            let id = row.id();
            if existing.get(id).is_ok_and(|current| current == row) {
                self.decide(T::KIND, id, Decision::Existing(id));
                self.tentative.insert((T::KIND, id));
            } else {
                self.decide(T::KIND, id, Decision::Insert);
            }
        }
    }

    /// Match rows of one kind through a key index seeded from the
    /// destination. The first source row with an unseen key is inserted and
    /// later ones alias it.
    fn match_by_key<T, K>(
        &mut self,
        dest: &EntityGraph,
        source: &EntityGraph,
        key: impl Fn(&T) -> K,
    ) where
        T: Entity,
        K: Hash + Eq,
    {
        let mut index: HashMap<K, Decision> = HashMap::new();
        for row in T::table(dest).iter() {
            index.entry(key(row)).or_insert(Decision::Existing(row.id()));
        }
        for row in T::table(source).iter() {
            let decision = match index.entry(key(row)) {
                Entry::Occupied(hit) => *hit.get(),
                Entry::Vacant(slot) => {
                    slot.insert(Decision::Alias(row.id()));
                    Decision::Insert
                }
            };
            self.decide(T::KIND, row.id(), decision);
        }
    }

    /// Clip keys are scoped to the library source that owns the clip, so two
    /// sources with a clip at the same offsets keep separate clips.
    /// Must run after library sources are decided.
    fn match_clips(&mut self, dest: &EntityGraph, source: &EntityGraph) {
        let mut owner: HashMap<Id, Id> = HashMap::new();
        for lib in source.library.iter() {
            for &clip in lib.clips.iter().chain(&lib.disabled_clips) {
                owner.entry(clip).or_insert(lib.id);
            }
        }

        let mut index: HashMap<(ClipScope, (u64, u64)), Decision> = HashMap::new();
        for lib in dest.library.iter() {
            for &clip_id in lib.clips.iter().chain(&lib.disabled_clips) {
                if let Ok(clip) = dest.clips.get(clip_id) {
                    index
                        .entry((ClipScope::Existing(lib.id), clip.business_key()))
                        .or_insert(Decision::Existing(clip_id));
                }
            }
        }
        for clip in dest.clips.iter() {
            index
                .entry((ClipScope::Unowned, clip.business_key()))
                .or_insert(Decision::Existing(clip.id));
        }

        for clip in source.clips.iter() {
            let scope = match owner.get(&clip.id) {
                None => ClipScope::Unowned,
                Some(&lib) => match self.landing(EntityKind::LibrarySource, lib) {
                    Some(Landing::Existing(dest_lib)) => ClipScope::Existing(dest_lib),
                    Some(Landing::Inserted(first)) => ClipScope::New(first),
                    None => ClipScope::New(lib),
                },
            };
            let decision = match index.entry((scope, clip.business_key())) {
                Entry::Occupied(hit) => *hit.get(),
                Entry::Vacant(slot) => {
                    slot.insert(Decision::Alias(clip.id));
                    Decision::Insert
                }
            };
            self.decide(EntityKind::Clip, clip.id, decision);
        }
    }

    /// Demote tentative exact matches until every remaining one refers only
    /// to rows that themselves land on the very same destination id.
    fn confirm(&mut self, source: &EntityGraph) {
        loop {
            let demoted: Vec<(EntityKind, Id)> = self
                .tentative
                .iter()
                .copied()
                .filter(|&(kind, id)| {
                    source.refs_of(kind, id).unwrap_or_default().iter().any(|&(k, r)| {
                        self.decision(k, r) != Some(Decision::Existing(r))
                    })
                })
                .collect();
            if demoted.is_empty() {
                return;
            }
            for (kind, id) in demoted {
                tracing::debug!(
                    "{} {} matches by value but not by references; inserting",
                    kind,
                    id
                );
                self.tentative.remove(&(kind, id));
                self.decide(kind, id, Decision::Insert);
            }
        }
    }

    /// Hand out final ids. New rows get ids from the scratch allocators in
    /// ascending source-id order, so the first equals the pre-merge `next_id`.
    fn allocate(&self, scratch: &mut EntityGraph) -> Result<IdMapping> {
        let mut mapping = IdMapping::new();
        for (&kind, decisions) in &self.decisions {
            let table = scratch.erased_mut(kind);
            for (&id, &decision) in decisions {
                if decision == Decision::Insert {
                    mapping.insert(kind, id, table.allocate()?);
                }
            }
        }
        for (&kind, decisions) in &self.decisions {
            for (&id, &decision) in decisions {
                let final_id = match decision {
                    Decision::Insert => continue,
                    Decision::Existing(dest_id) => Some(dest_id),
                    Decision::Alias(first) => match self.landing(kind, first) {
                        Some(Landing::Existing(dest_id)) => Some(dest_id),
                        Some(Landing::Inserted(inserted)) => mapping.get(kind, inserted),
                        None => None,
                    },
                };
                if let Some(final_id) = final_id {
                    mapping.insert(kind, id, final_id);
                }
            }
        }
        Ok(mapping)
    }
}

/// Merges source graphs into destination graphs under one policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Merge `source` into `dest`, returning the final id of every source row.
    ///
    /// All or nothing: on error `dest` is left exactly as it was.
    pub fn merge(&self, dest: &mut EntityGraph, source: &EntityGraph) -> Result<IdMapping> {
        let plan = self.plan(dest, source);
        let mut scratch = dest.clone();
        let mapping = plan.allocate(&mut scratch)?;

        let mut summary = Counts::default();
        self.commit::<Tag>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<Clip>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<LibrarySource>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<Audio>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<CaptionScript>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<Playlist>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<Scene>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<SceneGrid>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<Overlay>(&mut scratch, source, &plan, &mapping, &mut summary)?;
        self.commit::<SceneGroup>(&mut scratch, source, &plan, &mapping, &mut summary)?;

        let violations = validate(&scratch);
        if !violations.is_empty() {
            for violation in &violations {
                tracing::warn!("merge rejected: {}", violation);
            }
            return Err(StoreError::ValidationFailure(violations));
        }

        *dest = scratch;
        tracing::info!(
            "merged {} rows ({} inserted, {} matched) with {} policy",
            summary.inserted + summary.matched,
            summary.inserted,
            summary.matched,
            self.policy
        );
        Ok(mapping)
    }

    fn plan(&self, dest: &EntityGraph, source: &EntityGraph) -> Plan {
        let mut plan = Plan::default();
        match self.policy {
            MergePolicy::ExactEquality => {
                plan.match_exact::<Tag>(dest, source);
                plan.match_exact::<Clip>(dest, source);
                plan.match_exact::<LibrarySource>(dest, source);
                plan.match_exact::<Audio>(dest, source);
                plan.match_exact::<CaptionScript>(dest, source);
            }
            MergePolicy::BusinessKey => {
                plan.match_by_key::<Tag, _>(dest, source, |t| t.name.clone());
                plan.match_by_key::<LibrarySource, _>(dest, source, |s| s.url.clone());
                plan.match_clips(dest, source);
                plan.match_by_key::<Audio, _>(dest, source, |a| a.url.clone());
                plan.match_by_key::<CaptionScript, _>(dest, source, |s| s.url.clone());
            }
        }
        plan.match_exact::<Playlist>(dest, source);
        plan.match_exact::<Scene>(dest, source);
        plan.match_exact::<SceneGrid>(dest, source);
        plan.match_exact::<Overlay>(dest, source);
        plan.match_exact::<SceneGroup>(dest, source);
        plan.confirm(source);
        plan
    }

    /// Rewrite and store every source row of one kind.
    fn commit<T: Entity>(
        &self,
        scratch: &mut EntityGraph,
        source: &EntityGraph,
        plan: &Plan,
        mapping: &IdMapping,
        summary: &mut Counts,
    ) -> Result<()> {
        let table = T::table_mut(scratch);
        for row in T::table(source).iter() {
            let source_id = row.id();
            let final_id = mapping
                .get(T::KIND, source_id)
                .ok_or_else(|| StoreError::not_found(T::KIND, source_id))?;

            let mut entity = row.clone();
            entity.set_id(final_id);
            entity.remap_refs(&mut |target_kind, target_id| {
                mapping
                    .get(target_kind, target_id)
                    .ok_or(StoreError::DanglingReference {
                        kind: T::KIND,
                        id: source_id,
                        target_kind,
                        target_id,
                    })
            })?;

            if plan.decision(T::KIND, source_id) == Some(Decision::Insert) {
                table.create(entity)?;
                summary.inserted += 1;
            } else {
                if self.policy == MergePolicy::BusinessKey {
                    table.update(final_id, |existing| existing.absorb(&entity))?;
                }
                summary.matched += 1;
            }
        }
        tracing::debug!("committed {} rows of {}", T::table(source).len(), T::KIND);
        Ok(())
    }
}

/// Shorthand for `MergeEngine::new(policy).merge(dest, source)`.
pub fn merge(
    dest: &mut EntityGraph,
    source: &EntityGraph,
    policy: MergePolicy,
) -> Result<IdMapping> {
    MergeEngine::new(policy).merge(dest, source)
}
