use std::collections::HashMap;
use std::sync::Arc;

use log::info;

use super::{ContinuousSession, Frame, SessionState};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::transport::Transport;

/// Continuous sessions keyed by target, sharing one transport factory.
///
/// `toggle` mirrors a start/stop button: it starts the target's session when
/// idle and stops it when running.
pub struct SessionRegistry<T: Transport> {
    transport: Arc<T>,
    sessions: HashMap<String, ContinuousSession<T>>,
}

impl<T: Transport> SessionRegistry<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            sessions: HashMap::new(),
        }
    }

    pub fn toggle<F>(&mut self, config: SessionConfig, render: F) -> Result<SessionState, SessionError>
    where
        F: FnMut(&Frame) + Send + 'static,
    {
        config.validate()?;

        let transport = &self.transport;
        let session = self
            .sessions
            .entry(config.target.clone())
            .or_insert_with(|| ContinuousSession::new(transport.clone()));

        match session.state() {
            SessionState::Running => {
                info!("Toggling {} off", config.target);
                session.stop();
                Ok(SessionState::Idle)
            }
            SessionState::Idle => session.start(config, render),
        }
    }

    pub fn stop(&self, target: &str) {
        if let Some(session) = self.sessions.get(target) {
            session.stop();
        }
    }

    pub fn stop_all(&self) {
        for session in self.sessions.values() {
            session.stop();
        }
    }

    pub fn state(&self, target: &str) -> SessionState {
        self.sessions
            .get(target)
            .map_or(SessionState::Idle, ContinuousSession::state)
    }

    pub fn frame(&self, target: &str) -> Option<Frame> {
        self.sessions.get(target).map(ContinuousSession::current_frame)
    }

    pub fn running(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.state() == SessionState::Running)
            .map(|(target, _)| target.as_str())
            .collect();
        targets.sort_unstable();
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{FakeTransport, ok};
    use std::time::Duration;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn test_toggle_starts_and_stops() {
        let transport = FakeTransport::new([ok(10), ok(10), ok(10)]);
        let mut registry = SessionRegistry::new(Arc::new(transport.clone()));
        let config = SessionConfig::new("10.0.0.1");

        assert_eq!(registry.toggle(config.clone(), |_| {}).unwrap(), SessionState::Running);
        assert_eq!(registry.state("10.0.0.1"), SessionState::Running);
        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.frame("10.0.0.1").unwrap().values(), vec![10]);

        assert_eq!(registry.toggle(config, |_| {}).unwrap(), SessionState::Idle);
        assert_eq!(registry.state("10.0.0.1"), SessionState::Idle);
        assert_eq!(transport.created(), 1);
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_are_independent() {
        let transport = FakeTransport::default();
        let mut registry = SessionRegistry::new(Arc::new(transport.clone()));

        registry.toggle(SessionConfig::new("10.0.0.1"), |_| {}).unwrap();
        registry.toggle(SessionConfig::new("10.0.0.2"), |_| {}).unwrap();
        assert_eq!(registry.running(), vec!["10.0.0.1", "10.0.0.2"]);

        registry.stop("10.0.0.1");
        assert_eq!(registry.running(), vec!["10.0.0.2"]);
        assert_eq!(registry.state("10.0.0.2"), SessionState::Running);

        registry.stop_all();
        assert!(registry.running().is_empty());
        assert_eq!(transport.created(), 2);
        assert_eq!(transport.closed(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_targets() {
        let transport = FakeTransport::default();
        let mut registry = SessionRegistry::new(Arc::new(transport.clone()));

        assert_eq!(registry.state("192.0.2.1"), SessionState::Idle);
        assert!(registry.frame("192.0.2.1").is_none());

        let err = registry.toggle(SessionConfig::new(""), |_| {}).unwrap_err();
        assert!(err.is_invalid_configuration());
        assert!(registry.frame("").is_none());
        assert_eq!(transport.created(), 0);
    }
}
