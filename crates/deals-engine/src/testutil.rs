//! Scripted provider doubles for engine tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use deals_core::{
    AppId, EntityType, ErrorKind, FetchRequest, FetchResult, LookupMethod, Payload, ProviderClient,
    ProviderKind, Result,
};

use crate::orchestrator::CancelHandle;

#[derive(Debug, Clone)]
enum Behavior {
    Succeed {
        payload: Payload,
        method: LookupMethod,
    },
    Fail {
        error: ErrorKind,
    },
    /// Fail the first `failures` calls with a network error, then succeed.
    Flaky {
        failures: usize,
        payload: Payload,
    },
    /// Fail (not found) for the listed ids, succeed for everything else.
    PerId {
        fail_ids: HashSet<AppId>,
        payload: Payload,
        method: LookupMethod,
    },
}

/// A provider double driven by a fixed script.
#[derive(Debug)]
pub(crate) struct ScriptedProvider {
    kind: ProviderKind,
    entity: EntityType,
    behavior: Behavior,
    hint_on_failure: Option<String>,
    /// Total fetch invocations observed.
    pub(crate) calls: AtomicUsize,
    /// Name hint seen on the most recent request.
    pub(crate) last_hint: Mutex<Option<String>>,
    /// Trip this cancel handle once `calls` reaches the threshold.
    cancel_after: Mutex<Option<(usize, CancelHandle)>>,
}

impl ScriptedProvider {
    fn new(kind: ProviderKind, entity: EntityType, behavior: Behavior) -> Self {
        Self {
            kind,
            entity,
            behavior,
            hint_on_failure: None,
            calls: AtomicUsize::new(0),
            last_hint: Mutex::new(None),
            cancel_after: Mutex::new(None),
        }
    }

    pub(crate) fn succeeding(
        kind: ProviderKind,
        entity: EntityType,
        payload: Payload,
        method: LookupMethod,
    ) -> Self {
        Self::new(kind, entity, Behavior::Succeed { payload, method })
    }

    pub(crate) fn failing(kind: ProviderKind, entity: EntityType, error: ErrorKind) -> Self {
        Self::new(kind, entity, Behavior::Fail { error })
    }

    pub(crate) fn flaky(
        kind: ProviderKind,
        entity: EntityType,
        failures: usize,
        payload: Payload,
    ) -> Self {
        Self::new(kind, entity, Behavior::Flaky { failures, payload })
    }

    pub(crate) fn per_id(
        kind: ProviderKind,
        entity: EntityType,
        fail_ids: impl IntoIterator<Item = AppId>,
        payload: Payload,
        method: LookupMethod,
    ) -> Self {
        Self::new(
            kind,
            entity,
            Behavior::PerId {
                fail_ids: fail_ids.into_iter().collect(),
                payload,
                method,
            },
        )
    }

    /// A provider that records the hint it receives and succeeds via an
    /// assisted lookup.
    pub(crate) fn hint_echo(kind: ProviderKind, entity: EntityType, payload: Payload) -> Self {
        Self::new(
            kind,
            entity,
            Behavior::Succeed {
                payload,
                method: LookupMethod::Assisted,
            },
        )
    }

    pub(crate) fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint_on_failure = Some(hint.into());
        self
    }

    pub(crate) fn set_cancel_after(&self, calls: usize, handle: CancelHandle) {
        *self.cancel_after.lock().unwrap() = Some((calls, handle));
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn supports(&self, entity: EntityType) -> bool {
        entity == self.entity
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_hint.lock().unwrap() = request.name_hint.clone();

        if let Some((threshold, handle)) = self.cancel_after.lock().unwrap().as_ref() {
            if count >= *threshold {
                handle.cancel();
            }
        }

        let result = match &self.behavior {
            Behavior::Succeed { payload, method } => FetchResult::success(
                request.app_id.clone(),
                payload.clone(),
                self.kind,
                *method,
            ),
            Behavior::Fail { error } => {
                let failure = FetchResult::failure(
                    request.app_id.clone(),
                    request.entity,
                    self.kind,
                    *error,
                );
                match &self.hint_on_failure {
                    Some(hint) => failure.with_hint(hint.clone()),
                    None => failure,
                }
            }
            Behavior::Flaky { failures, payload } => {
                if count <= *failures {
                    FetchResult::failure(
                        request.app_id.clone(),
                        request.entity,
                        self.kind,
                        ErrorKind::Network,
                    )
                } else {
                    FetchResult::success(
                        request.app_id.clone(),
                        payload.clone(),
                        self.kind,
                        LookupMethod::DirectId,
                    )
                }
            }
            Behavior::PerId {
                fail_ids,
                payload,
                method,
            } => {
                if fail_ids.contains(&request.app_id) {
                    FetchResult::failure(
                        request.app_id.clone(),
                        request.entity,
                        self.kind,
                        ErrorKind::NotFound,
                    )
                } else {
                    FetchResult::success(
                        request.app_id.clone(),
                        payload.clone(),
                        self.kind,
                        *method,
                    )
                }
            }
        };

        Ok(result)
    }
}
