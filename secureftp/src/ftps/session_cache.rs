//! # Session cache
//!
//! Keeps the last negotiated TLS session of an FTPS session, so that every data channel
//! can resume the session established on the control channel.

/// Holds at most one TLS session, overwritten by every handshake
#[derive(Debug)]
pub struct SessionCache<S> {
    session: Option<S>,
}

impl<S> Default for SessionCache<S> {
    fn default() -> Self {
        Self { session: None }
    }
}

impl<S> SessionCache<S> {
    /// Session to offer to the next handshake
    pub fn get(&self) -> Option<&S> {
        self.session.as_ref()
    }

    pub fn store(&mut self, session: S) {
        self.session = Some(session);
    }

    pub fn clear(&mut self) {
        self.session = None;
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_none()
    }
}

#[cfg(test)]
mod test {

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn should_keep_only_last_session() {
        let mut cache: SessionCache<u32> = SessionCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.get(), None);
        cache.store(1);
        cache.store(2);
        assert_eq!(cache.get(), Some(&2));
        cache.clear();
        assert!(cache.is_empty());
    }
}
