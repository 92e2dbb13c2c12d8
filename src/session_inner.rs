use crate::serializer::SessionData;

/// Represents a current, active session
struct ActiveSession {
    /// Session identifier. `None` until the store has created the session.
    id: Option<String>,
    /// Original session data
    data: SessionData,
    /// Updated session data
    pending_data: Option<SessionData>,
}

impl ActiveSession {
    /// Create a new active session, to be saved in the store
    fn new(new_data: SessionData) -> Self {
        Self {
            id: None,
            data: new_data.clone(),
            pending_data: Some(new_data),
        }
    }

    /// Active session that already exists in the store
    fn existing(id: String, data: SessionData) -> Self {
        Self {
            id: Some(id),
            data,
            pending_data: None,
        }
    }
}

/// Changes to apply to the store at the end of the request
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    /// Identifier of a session deleted during the request
    pub(crate) deleted: Option<String>,
    /// Session to save: its identifier (if already stored) and data
    pub(crate) updated: Option<(Option<String>, SessionData)>,
    /// Identifier of a session that was loaded but not changed
    pub(crate) unchanged: Option<String>,
    /// The request carried a session cookie that didn't resolve to a session
    pub(crate) stale_cookie: bool,
}

/** Mutable session state, passed from the Session request guard */
#[derive(Default)]
pub(crate) struct SessionInner {
    /// The current, active session
    current: Option<ActiveSession>,
    /// The identifier of the original session if deleted during the request
    deleted: Option<String>,
    /// Whether the request's session cookie pointed at nothing usable
    stale_cookie: bool,
}

impl SessionInner {
    pub(crate) fn new_existing(id: String, data: SessionData) -> Self {
        Self {
            current: Some(ActiveSession::existing(id, data)),
            ..Default::default()
        }
    }

    pub(crate) fn new_stale() -> Self {
        Self {
            stale_cookie: true,
            ..Default::default()
        }
    }

    pub(crate) fn get_id(&self) -> Option<&str> {
        self.current.as_ref().and_then(|s| s.id.as_deref())
    }

    pub(crate) fn get_current_data(&self) -> Option<&SessionData> {
        self.current
            .as_ref()
            .map(|s| s.pending_data.as_ref().unwrap_or(&s.data))
    }

    pub(crate) fn is_new(&self) -> bool {
        self.current.as_ref().is_some_and(|s| s.id.is_none())
    }

    pub(crate) fn set_data(&mut self, new_data: SessionData) {
        match &mut self.current {
            Some(current) => current.pending_data = Some(new_data),
            None => self.current = Some(ActiveSession::new(new_data)),
        }
    }

    pub(crate) fn tap_data_mut<UpdateFn, R>(&mut self, callback: UpdateFn) -> R
    where
        UpdateFn: FnOnce(&mut Option<SessionData>) -> R,
    {
        match &mut self.current {
            Some(current) => {
                if current.pending_data.is_none() {
                    current.pending_data = Some(current.data.clone());
                }
                let response = callback(&mut current.pending_data);
                if current.pending_data.is_none() {
                    self.delete();
                }
                response
            }
            None => {
                let mut pending_data = None;
                let response = callback(&mut pending_data);
                if let Some(new_data) = pending_data {
                    self.current = Some(ActiveSession::new(new_data));
                }
                response
            }
        }
    }

    /// Mark the current session as deleted, and clear all data. Can safely be called
    /// multiple times in a request - the original session will still be deleted.
    pub(crate) fn delete(&mut self) {
        if let Some(id) = self.current.take().and_then(|current| current.id) {
            self.deleted.get_or_insert(id);
        }
    }

    /// Take all changes needed to update the store. This should only be called
    /// once at the end of the request.
    pub(crate) fn take_for_storage(&mut self) -> PendingChanges {
        let mut changes = PendingChanges {
            deleted: self.deleted.take(),
            stale_cookie: std::mem::take(&mut self.stale_cookie),
            ..Default::default()
        };
        if let Some(current) = self.current.take() {
            match current.pending_data {
                Some(data) => changes.updated = Some((current.id, data)),
                None => changes.unchanged = current.id,
            }
        }
        changes
    }
}
