//! Source Reconciliation
//!
//! Diffs a desired snapshot of source declarations against the live
//! suppression units and applies the minimal set of create / update /
//! release operations. Afterwards a unit is live for `id` if and only if
//! the snapshot holds an active declaration for `id`.
//!
//! # Algorithm
//!
//! 1. Collect active declarations; on duplicate ids the last one wins.
//! 2. Release every live unit whose id is not wanted.
//! 3. Create a unit for every wanted id without one.
//! 4. For surviving units, forward only the parameters that changed.
//!
//! A surviving unit is never recreated: identity is stable across any
//! number of parameter edits.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::session::{SessionHandle, SessionId};
use crate::source::{SourceDeclaration, SourceId};
use crate::unit::SuppressionUnitHandle;

/// A source the reconciler could not bring in line this pass
#[derive(Debug)]
pub struct SourceFailure {
    pub id: SourceId,
    pub error: EngineError,
}

/// What one reconciliation pass changed
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: Vec<SourceId>,
    pub updated: Vec<SourceId>,
    pub released: Vec<SourceId>,
    pub failed: Vec<SourceFailure>,
}

impl ReconcileReport {
    /// Whether the pass changed nothing and failed nothing
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.released.is_empty()
            && self.failed.is_empty()
    }

    /// Number of graph mutations performed
    pub fn mutation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.released.len()
    }
}

/// Maps source ids to their live suppression units
#[derive(Debug, Default)]
pub struct Reconciler {
    units: HashMap<SourceId, SuppressionUnitHandle>,
    session: Option<SessionId>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the live units in line with `desired`
    ///
    /// Per-source failures (invalid declaration, graph full) are collected
    /// in the report and the rest of the snapshot is still applied; the
    /// failed source is retried on the next call. Programming errors abort
    /// the call.
    ///
    /// Against an inactive session this is a no-op; units bound to it are
    /// forgotten, since stopping the session already released them.
    pub fn reconcile(
        &mut self,
        desired: &[SourceDeclaration],
        session: &SessionHandle,
    ) -> EngineResult<ReconcileReport> {
        if !session.is_active() {
            self.forget_session(session.id());
            return Ok(ReconcileReport::default());
        }
        self.bind(session)?;

        let wanted = wanted_declarations(desired);
        let wanted_ids: HashSet<&SourceId> = wanted.iter().map(|decl| &decl.id).collect();
        let mut report = ReconcileReport::default();

        let mut stale: Vec<SourceId> = self
            .units
            .keys()
            .filter(|id| !wanted_ids.contains(id))
            .cloned()
            .collect();
        stale.sort();

        for id in stale {
            let Some(unit) = self.units.get_mut(&id) else {
                continue;
            };
            match unit.release(session) {
                Ok(()) => {
                    self.units.remove(&id);
                    report.released.push(id);
                }
                Err(e) if e.is_programming_error() => return Err(e),
                Err(error) => {
                    warn!("Release of '{}' deferred: {}", id, error);
                    report.failed.push(SourceFailure { id, error });
                }
            }
        }

        for decl in wanted {
            let params = match decl.sanitized() {
                Ok(params) => params,
                Err(error) => {
                    warn!("Skipping source '{}': {}", decl.id, error);
                    report.failed.push(SourceFailure {
                        id: decl.id.clone(),
                        error,
                    });
                    continue;
                }
            };

            let outcome = match self.units.get_mut(&decl.id) {
                None => SuppressionUnitHandle::create(session, decl.id.clone(), params).map(|unit| {
                    self.units.insert(decl.id.clone(), unit);
                    report.created.push(decl.id.clone());
                }),
                Some(unit) => {
                    let mut changed = false;
                    let mut result = Ok(());
                    if unit.frequency_target() != params.frequency_hz {
                        result = unit.set_frequency(session, params.frequency_hz);
                        changed = true;
                    }
                    if result.is_ok() && unit.intensity_target() != params.intensity {
                        result = unit.set_intensity(session, params.intensity);
                        changed = true;
                    }
                    if changed && result.is_ok() {
                        report.updated.push(decl.id.clone());
                    }
                    result
                }
            };

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_programming_error() => return Err(e),
                Err(error) => {
                    warn!("Source '{}' not applied: {}", decl.id, error);
                    report.failed.push(SourceFailure {
                        id: decl.id.clone(),
                        error,
                    });
                }
            }
        }

        if !report.is_noop() {
            debug!(
                "Reconciled: +{} ~{} -{} !{}",
                report.created.len(),
                report.updated.len(),
                report.released.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }

    /// Release every live unit and unbind from the session
    pub fn teardown(&mut self, session: &SessionHandle) -> EngineResult<Vec<SourceId>> {
        if !session.is_active() {
            self.forget_session(session.id());
            return Ok(Vec::new());
        }
        self.bind(session)?;

        let mut ids: Vec<SourceId> = self.units.keys().cloned().collect();
        ids.sort();
        for id in &ids {
            if let Some(mut unit) = self.units.remove(id) {
                if let Err(e) = unit.release(session) {
                    // The session stop that follows frees the graph anyway
                    unit.forget();
                    if e.is_programming_error() {
                        self.forget_session(session.id());
                        return Err(e);
                    }
                    warn!("Release of '{}' during teardown failed: {}", id, e);
                }
            }
        }
        self.session = None;
        Ok(ids)
    }

    /// Drop every handle bound to `session` without touching the graph
    pub fn forget_session(&mut self, session: SessionId) {
        if self.session != Some(session) {
            return;
        }
        if !self.units.is_empty() {
            debug!(
                "Forgetting {} units of stopped session {}",
                self.units.len(),
                session
            );
        }
        for (_, mut unit) in self.units.drain() {
            unit.forget();
        }
        self.session = None;
    }

    /// Ids with a live unit, sorted
    pub fn live_ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.units.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn unit(&self, id: &SourceId) -> Option<&SuppressionUnitHandle> {
        self.units.get(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    fn bind(&mut self, session: &SessionHandle) -> EngineResult<()> {
        match self.session {
            Some(bound) if bound != session.id() && !self.units.is_empty() => {
                Err(EngineError::InvariantViolation(format!(
                    "reconcile against session {} while {} units are live on session {}",
                    session.id(),
                    self.units.len(),
                    bound
                )))
            }
            _ => {
                self.session = Some(session.id());
                Ok(())
            }
        }
    }
}

/// Active declarations in snapshot order; the last duplicate of an id wins
fn wanted_declarations(desired: &[SourceDeclaration]) -> Vec<&SourceDeclaration> {
    let mut last: HashMap<&SourceId, usize> = HashMap::new();
    for (index, decl) in desired.iter().enumerate() {
        if decl.active && last.insert(&decl.id, index).is_some() {
            warn!("Duplicate declaration for '{}'; last one wins", decl.id);
        }
    }

    desired
        .iter()
        .enumerate()
        .filter(|(index, decl)| decl.active && last.get(&decl.id) == Some(index))
        .map(|(_, decl)| decl)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::OfflineBackend;
    use crate::config::EngineConfig;
    use crate::session::CaptureSessionManager;
    use crate::source::NoiseKind;

    fn start() -> (OfflineBackend, CaptureSessionManager, SessionHandle) {
        let backend = OfflineBackend::new();
        let mut sessions =
            CaptureSessionManager::new(Arc::new(backend.clone()), EngineConfig::default());
        let handle = sessions.start().unwrap();
        (backend, sessions, handle)
    }

    fn ids(list: &[&str]) -> Vec<SourceId> {
        list.iter().map(|id| SourceId::new(*id)).collect()
    }

    #[test]
    fn test_creates_only_active_sources() {
        let (_backend, _sessions, session) = start();
        let mut reconciler = Reconciler::new();
        let desired = vec![
            SourceDeclaration::from_preset("ac", NoiseKind::Ac),
            SourceDeclaration::from_preset("music", NoiseKind::Music).with_active(false),
        ];

        let report = reconciler.reconcile(&desired, &session).unwrap();
        assert_eq!(report.created, ids(&["ac"]));
        assert_eq!(reconciler.live_ids(), ids(&["ac"]));
        assert_eq!(session.live_unit_count(), 1);
        reconciler.teardown(&session).unwrap();
    }

    #[test]
    fn test_second_pass_is_noop() {
        let (_backend, _sessions, session) = start();
        let mut reconciler = Reconciler::new();
        let desired = vec![
            SourceDeclaration::new("a", 120.0, 0.7),
            SourceDeclaration::new("b", 800.0, 0.6),
        ];

        reconciler.reconcile(&desired, &session).unwrap();
        let report = reconciler.reconcile(&desired, &session).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.mutation_count(), 0);
        reconciler.teardown(&session).unwrap();
    }

    #[test]
    fn test_update_keeps_identity() {
        let (_backend, _sessions, session) = start();
        let mut reconciler = Reconciler::new();
        let a = SourceId::new("a");

        reconciler
            .reconcile(&[SourceDeclaration::new("a", 120.0, 0.7)], &session)
            .unwrap();
        let key = reconciler.unit(&a).unwrap().key();

        for freq in [150.0, 200.0, 250.0] {
            let report = reconciler
                .reconcile(&[SourceDeclaration::new("a", freq, 0.3)], &session)
                .unwrap();
            assert!(report.created.is_empty() && report.released.is_empty());
        }

        let unit = reconciler.unit(&a).unwrap();
        assert_eq!(unit.key(), key);
        assert_eq!(unit.frequency_target(), 250.0);
        assert_eq!(unit.intensity_target(), 0.3);
        reconciler.teardown(&session).unwrap();
    }

    #[test]
    fn test_deactivation_releases() {
        let (_backend, _sessions, session) = start();
        let mut reconciler = Reconciler::new();
        let decl = SourceDeclaration::new("a", 120.0, 0.7);

        reconciler.reconcile(&[decl.clone()], &session).unwrap();
        let report = reconciler
            .reconcile(&[decl.with_active(false)], &session)
            .unwrap();
        assert_eq!(report.released, ids(&["a"]));
        assert!(reconciler.is_empty());
        assert_eq!(session.live_unit_count(), 0);
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        let (_backend, _sessions, session) = start();
        let mut reconciler = Reconciler::new();
        let desired = vec![
            SourceDeclaration::new("a", 120.0, 0.7),
            SourceDeclaration::new("a", 900.0, 0.2),
        ];

        let report = reconciler.reconcile(&desired, &session).unwrap();
        assert_eq!(report.created, ids(&["a"]));
        let unit = reconciler.unit(&SourceId::new("a")).unwrap();
        assert_eq!(unit.frequency_target(), 900.0);
        assert_eq!(session.live_unit_count(), 1);
        reconciler.teardown(&session).unwrap();
    }

    #[test]
    fn test_invalid_declaration_fails_alone() {
        let (_backend, _sessions, session) = start();
        let mut reconciler = Reconciler::new();
        let desired = vec![
            SourceDeclaration::new("bad", -5.0, 0.7),
            SourceDeclaration::new("good", 250.0, 0.5),
        ];

        let report = reconciler.reconcile(&desired, &session).unwrap();
        assert_eq!(report.created, ids(&["good"]));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, SourceId::new("bad"));
        assert!(matches!(
            report.failed[0].error,
            EngineError::InvalidDeclaration { .. }
        ));
        reconciler.teardown(&session).unwrap();
    }

    #[test]
    fn test_inactive_session_is_noop_and_forgets() {
        let (_backend, mut sessions, session) = start();
        let mut reconciler = Reconciler::new();
        reconciler
            .reconcile(&[SourceDeclaration::new("a", 120.0, 0.7)], &session)
            .unwrap();

        sessions.stop();
        let report = reconciler
            .reconcile(&[SourceDeclaration::new("b", 250.0, 0.7)], &session)
            .unwrap();
        assert!(report.is_noop());
        assert!(reconciler.is_empty());
        assert!(reconciler.session().is_none());
    }

    #[test]
    fn test_foreign_session_with_live_units_is_violation() {
        let (_backend, _sessions, session) = start();
        let (_other_backend, _other_sessions, other) = start();
        let mut reconciler = Reconciler::new();
        reconciler
            .reconcile(&[SourceDeclaration::new("a", 120.0, 0.7)], &session)
            .unwrap();

        let err = reconciler
            .reconcile(&[SourceDeclaration::new("a", 120.0, 0.7)], &other)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
        reconciler.teardown(&session).unwrap();
    }

    #[test]
    fn test_teardown_releases_everything() {
        let (backend, _sessions, session) = start();
        let mut reconciler = Reconciler::new();
        reconciler
            .reconcile(
                &[
                    SourceDeclaration::new("b", 120.0, 0.7),
                    SourceDeclaration::new("a", 800.0, 0.6),
                ],
                &session,
            )
            .unwrap();
        backend.advance(64);

        let released = reconciler.teardown(&session).unwrap();
        assert_eq!(released, ids(&["a", "b"]));
        backend.advance(64);
        assert_eq!(backend.unit_count(), 0);
        assert_eq!(session.live_unit_count(), 0);
    }

    #[test]
    fn test_wanted_declarations_order() {
        let desired = vec![
            SourceDeclaration::new("a", 100.0, 0.1),
            SourceDeclaration::new("b", 200.0, 0.2),
            SourceDeclaration::new("a", 300.0, 0.3),
            SourceDeclaration::new("c", 400.0, 0.4).with_active(false),
        ];
        let wanted = wanted_declarations(&desired);
        let got: Vec<(&str, f32)> = wanted
            .iter()
            .map(|d| (d.id.as_str(), d.center_frequency_hz))
            .collect();
        assert_eq!(got, vec![("b", 200.0), ("a", 300.0)]);
    }
}
