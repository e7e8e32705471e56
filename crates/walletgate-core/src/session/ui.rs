use async_trait::async_trait;

/// Hooks the session manager calls into the UI layer.
#[async_trait]
pub trait SessionUi: Send + Sync {
    /// Tell the user their session expired. The forced logout waits for
    /// this to return, so a modal prompt should resolve when dismissed.
    async fn session_expired(&self);

    /// Navigate to the unauthenticated entry point.
    fn redirect_to_login(&self);
}

/// UI hooks that do nothing, for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessUi;

#[async_trait]
impl SessionUi for HeadlessUi {
    async fn session_expired(&self) {}

    fn redirect_to_login(&self) {}
}
