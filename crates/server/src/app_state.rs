use crate::{slack::SlackRelay, volumes::VolumesClient};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) volumes: VolumesClient,
    pub(crate) slack: SlackRelay,
}
