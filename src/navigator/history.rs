use url::Url;

/// Back/forward stack of visited URIs.
///
/// Nothing moves until a page has actually been shown: callers peek at
/// [`back_target`](NavHistory::back_target) or
/// [`forward_target`](NavHistory::forward_target), load it, and report the
/// result through [`visit`](NavHistory::visit).
#[derive(Debug, Default)]
pub struct NavHistory {
    entries: Vec<Url>,
    /// Index of the current entry; meaningless while `entries` is empty
    position: usize,
}

impl NavHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Url> {
        self.entries.get(self.position)
    }

    pub fn back_target(&self) -> Option<&Url> {
        if self.entries.is_empty() || self.position == 0 {
            return None;
        }
        self.entries.get(self.position - 1)
    }

    pub fn forward_target(&self) -> Option<&Url> {
        self.entries.get(self.position + 1)
    }

    /// Record that `uri` was shown. Landing on a neighbouring entry moves
    /// the position there; any other URI discards the forward entries and
    /// becomes the new top.
    pub fn visit(&mut self, uri: Url) {
        if self.current() == Some(&uri) {
            return;
        }
        if self.back_target() == Some(&uri) {
            self.position -= 1;
            return;
        }
        if self.forward_target() == Some(&uri) {
            self.position += 1;
            return;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.position + 1);
        }
        self.entries.push(uri);
        self.position = self.entries.len() - 1;
    }
}
