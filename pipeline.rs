use crate::content::ContentTable;
use crate::error::Result;
use crate::gateway::ModelGateway;
use crate::models::{ClassifyOutcome, LabelContent};
use crate::normalize::normalize;
use crate::rank::rank;
use crate::session::SessionStore;
use crate::video::resolve_video;
use std::sync::Arc;
use uuid::Uuid;

/// The prediction-to-content pipeline: uploaded bytes in, ranked
/// probabilities plus the predicted label's content panel out. Steps run
/// sequentially; session state is updated along the way per the error
/// policy (a decode or inference failure never touches the prediction
/// slot).
pub struct Pipeline {
    gateway: Arc<ModelGateway>,
    content: ContentTable,
    sessions: Arc<SessionStore>,
}

impl Pipeline {
    pub fn new(
        gateway: Arc<ModelGateway>,
        content: ContentTable,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            gateway,
            content,
            sessions,
        }
    }

    pub fn vocabulary(&self) -> Result<Arc<Vec<String>>> {
        self.gateway.initialize()
    }

    /// Runs one full classification cycle for a session. The uploaded bytes
    /// are recorded before decoding, mirroring the arrival-overwrites rule
    /// for the image slot; the prediction slot is only written after a
    /// successful inference.
    pub fn classify(&self, session_id: Uuid, raw: &[u8]) -> Result<ClassifyOutcome> {
        self.sessions.put_image(session_id, raw.to_vec());

        let image = normalize(raw)?;
        let prediction = self.gateway.predict(&image)?;
        let vocabulary = self.gateway.initialize()?;
        let ranked = rank(&vocabulary, &prediction.probabilities)?;

        self.sessions.record_prediction(session_id, &prediction.label);
        log::info!(
            "Predicted '{}' ({}) for session {}",
            prediction.label,
            ranked[0].percent(),
            session_id
        );

        Ok(ClassifyOutcome {
            content: self.content_for(&prediction.label),
            predicted_label: prediction.label,
            ranked,
        })
    }

    /// Resolves the content panel for any label, the predicted one or a
    /// user-selected alternative. Never fails: unmapped labels and
    /// unparseable video URLs degrade to empty lists and bare links.
    pub fn content_for(&self, label: &str) -> LabelContent {
        let bundle = self.content.resolve(label);
        LabelContent {
            texts: bundle.texts,
            images: bundle.images,
            videos: bundle
                .videos
                .iter()
                .map(|url| resolve_video(url))
                .collect(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
