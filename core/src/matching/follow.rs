/// Follow ("connection") requests within one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowState {
    /// We asked and are waiting for `connection_accepted`/`rejected`.
    pub outgoing_pending: bool,
    /// The partner asked; answered with `respond_to_connection_request`.
    pub incoming: Option<String>,
}

impl FollowState {
    pub fn can_request(&self) -> bool {
        !self.outgoing_pending
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
