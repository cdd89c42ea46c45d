use std::path::{Path, PathBuf};

use gemini_chat::{
    media, Config, ConversationStore, MessageId, Mode, PendingImage, SubmitRejected, TurnReply,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// An image the user picked, waiting for the next submit.
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub name: String,
    pub image: PendingImage,
}

pub struct App {
    pub should_quit: bool,
    pub store: ConversationStore,
    pub config: Config,

    // Prompt input
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars
    pub staged_image: Option<StagedImage>,

    // Request in flight
    pub reply_task: Option<JoinHandle<TurnReply>>,
    pub reply_placeholder: Option<MessageId>,

    // Chat scrolling; the renderer clamps and reports the maximum
    pub chat_scroll: u16,
    pub chat_max_scroll: u16,
    pub follow_bottom: bool,

    // Animation state
    pub animation_frame: u8, // 0-2, which dot of the loading indicator is lit

    // Attach prompt state
    pub show_attach_input: bool,
    pub attach_input: String,
    pub attach_cursor: usize,

    // One-line feedback in the footer
    pub status: Option<String>,
}

impl App {
    pub fn new(store: ConversationStore, config: Config) -> Self {
        Self {
            should_quit: false,
            store,
            config,

            input: String::new(),
            input_cursor: 0,
            staged_image: None,

            reply_task: None,
            reply_placeholder: None,

            chat_scroll: 0,
            chat_max_scroll: 0,
            follow_bottom: true,

            animation_frame: 0,

            show_attach_input: false,
            attach_input: String::new(),
            attach_cursor: 0,

            status: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.store.mode()
    }

    /// The input is locked while a request is in flight.
    pub fn input_locked(&self) -> bool {
        self.store.is_loading()
    }

    /// Send the current input (and staged image, in chat mode).
    pub fn submit(&mut self) {
        // A staged image stays staged in image mode; it belongs to the next chat turn
        let image = if self.mode().accepts_attachments() {
            self.staged_image.as_ref().map(|staged| staged.image.clone())
        } else {
            None
        };

        let sends_image = image.is_some();

        match self.store.begin_submit(&self.input, image) {
            Ok(turn) => {
                self.reply_placeholder = Some(turn.placeholder_id());
                self.reply_task = Some(tokio::spawn(turn.dispatch()));

                self.input.clear();
                self.input_cursor = 0;
                if sends_image {
                    self.staged_image = None;
                }
                self.status = None;
                self.follow_bottom = true;
            }
            Err(SubmitRejected::Empty) => {}
            Err(e @ SubmitRejected::Busy) => {
                self.status = Some(format!("Not sent: {}", e));
            }
        }
    }

    /// Fold a finished reply into the conversation, if there is one.
    pub async fn poll_reply(&mut self) {
        let finished = self
            .reply_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        let Some(task) = self.reply_task.take() else {
            return;
        };
        let placeholder = self.reply_placeholder.take();

        match task.await {
            Ok(reply) => {
                self.store.resolve(reply);
            }
            Err(e) => {
                error!(error = %e, "reply task failed");
                if let Some(id) = placeholder {
                    self.store.abandon(id);
                }
            }
        }
        self.follow_bottom = true;
    }

    pub fn toggle_mode(&mut self) {
        let mode = self.store.toggle_mode();
        if let Err(e) = Config::save_default_mode(mode) {
            warn!(error = %e, "could not persist mode");
        }
    }

    pub fn open_attach_input(&mut self) {
        if !self.mode().accepts_attachments() {
            self.status = Some("Images can only be attached in Chat mode".to_string());
            return;
        }
        self.show_attach_input = true;
        self.attach_input.clear();
        self.attach_cursor = 0;
    }

    pub fn close_attach_input(&mut self) {
        self.show_attach_input = false;
        self.attach_input.clear();
        self.attach_cursor = 0;
    }

    /// Read the file named in the attach prompt and stage it.
    pub async fn attach_from_input(&mut self) {
        let path = clean_path(&self.attach_input);
        self.close_attach_input();
        if path.as_os_str().is_empty() {
            return;
        }

        match media::encode_file(&path).await {
            Ok(image) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                info!(%name, mime = %image.mime_type, "image attached");
                self.status = None;
                self.staged_image = Some(StagedImage { name, image });
            }
            Err(e) => {
                warn!(error = %e, "attach failed");
                self.status = Some(format!("Could not attach image: {}", e));
            }
        }
    }

    pub fn remove_staged_image(&mut self) {
        if self.staged_image.take().is_some() {
            self.status = Some("Attachment removed".to_string());
        }
    }

    /// Write the most recent generated image to the download directory.
    pub async fn save_last_image(&mut self) {
        let Some((id, uri)) = self.store.last_image() else {
            self.status = Some("No generated image to save yet".to_string());
            return;
        };

        let dir = self.config.download_dir();
        let stem = format!("gemini-{}", id);
        self.status = Some(match media::save_data_uri(uri, &dir, &stem).await {
            Ok(path) => format!("Saved {}", path.display()),
            Err(e) => {
                warn!(error = %e, "save failed");
                format!("Could not save image: {}", e)
            }
        });
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.store.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.min(self.chat_max_scroll).saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.chat_max_scroll);
        self.follow_bottom = self.chat_scroll >= self.chat_max_scroll;
    }
}

/// Accept pasted paths: strip quotes and expand a leading `~`.
fn clean_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');

    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(trimmed).to_path_buf()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use gemini_chat::{GenerationGateway, ImageOutcome, Part, Result};

    use super::*;

    struct EchoGateway;

    #[async_trait]
    impl GenerationGateway for EchoGateway {
        async fn generate_text(&self, prompt: &str, _image: Option<&PendingImage>) -> Result<String> {
            Ok(format!("echo: {}", prompt))
        }

        async fn generate_image(&self, _prompt: &str) -> Result<ImageOutcome> {
            Ok(ImageOutcome::Failure("no images here".to_string()))
        }
    }

    fn app() -> App {
        let store = ConversationStore::new(Arc::new(EchoGateway));
        App::new(store, Config::new())
    }

    async fn wait_for_reply(app: &mut App) {
        while app.reply_task.is_some() {
            tokio::task::yield_now().await;
            app.poll_reply().await;
        }
    }

    #[tokio::test]
    async fn test_submit_round_trip() {
        let mut app = app();
        app.input = "hello".to_string();
        app.input_cursor = 5;

        app.submit();
        assert!(app.input.is_empty());
        assert!(app.input_locked());

        wait_for_reply(&mut app).await;
        assert!(!app.input_locked());
        assert_eq!(app.store.messages()[1].parts, vec![Part::Text("echo: hello".into())]);
    }

    #[tokio::test]
    async fn test_staged_image_is_not_sent_in_image_mode() {
        let mut app = app();
        app.store.set_mode(Mode::Image);
        app.staged_image = Some(StagedImage {
            name: "cat.png".into(),
            image: PendingImage::new("Zm9v", "image/png"),
        });
        app.input = "a cat".to_string();

        app.submit();
        wait_for_reply(&mut app).await;

        assert_eq!(app.store.messages()[0].parts, vec![Part::Text("a cat".into())]);
        assert_eq!(app.store.messages()[1].parts, vec![Part::Text("no images here".into())]);
        assert_eq!(app.staged_image.as_ref().map(|s| s.name.as_str()), Some("cat.png"));
    }

    #[tokio::test]
    async fn test_staged_image_is_sent_and_cleared_in_chat_mode() {
        let mut app = app();
        app.staged_image = Some(StagedImage {
            name: "cat.png".into(),
            image: PendingImage::new("Zm9v", "image/png"),
        });
        app.input = "what is this".to_string();

        app.submit();
        wait_for_reply(&mut app).await;

        assert!(app.staged_image.is_none());
        let urls: Vec<&str> = app.store.messages()[0].image_urls().collect();
        assert_eq!(urls, vec!["data:image/png;base64,Zm9v"]);
    }

    #[tokio::test]
    async fn test_attach_missing_file_sets_status() {
        let mut app = app();
        app.attach_input = "/definitely/not/here.png".to_string();

        app.attach_from_input().await;

        assert!(app.staged_image.is_none());
        assert!(!app.show_attach_input);
        assert!(app.status.as_deref().unwrap().starts_with("Could not attach image"));
    }

    #[tokio::test]
    async fn test_attach_quoted_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fox.jpg");
        std::fs::write(&path, b"foo").unwrap();

        let mut app = app();
        app.attach_input = format!("'{}'", path.display());
        app.attach_from_input().await;

        let staged = app.staged_image.as_ref().unwrap();
        assert_eq!(staged.name, "fox.jpg");
        assert_eq!(staged.image.mime_type, "image/jpeg");
    }

    #[test]
    fn test_scroll_clamps_and_follows() {
        let mut app = app();
        app.chat_max_scroll = 10;
        app.chat_scroll = 10;

        app.scroll_up(3);
        assert_eq!(app.chat_scroll, 7);
        assert!(!app.follow_bottom);

        app.scroll_down(50);
        assert_eq!(app.chat_scroll, 10);
        assert!(app.follow_bottom);
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("  \"/tmp/a b.png\" "), PathBuf::from("/tmp/a b.png"));
        assert_eq!(clean_path("rel.png"), PathBuf::from("rel.png"));
    }
}
