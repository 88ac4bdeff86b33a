/// What the presentation should do after an event for some path arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retarget {
    /// The active file changed to the event's path.
    Switch,
    /// The active file itself was updated.
    Refresh,
    /// The event concerns a file that is not on screen.
    Unaffected,
}

/// Merges the user's pin with follow-latest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    selected: Option<String>,
    latest: Option<String>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `path`, or unpins when `None` or when `path` is already pinned.
    /// Returns true when the active path changed.
    pub fn select(&mut self, path: Option<&str>) -> bool {
        let before = self.active_path().map(str::to_string);
        self.selected = match path {
            Some(path) if self.selected.as_deref() == Some(path) => None,
            Some(path) => Some(path.to_string()),
            None => None,
        };
        before.as_deref() != self.active_path()
    }

    pub fn on_event(&mut self, path: &str) -> Retarget {
        let was_latest = self.latest.as_deref() == Some(path);
        self.latest = Some(path.to_string());
        match self.selected.as_deref() {
            Some(pinned) if pinned == path => Retarget::Refresh,
            Some(_) => Retarget::Unaffected,
            None if was_latest => Retarget::Refresh,
            None => Retarget::Switch,
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    pub fn is_pinned(&self) -> bool {
        self.selected.is_some()
    }

    pub fn active_path(&self) -> Option<&str> {
        self.selected.as_deref().or(self.latest.as_deref())
    }
}
