//! Data logging toolkit.

use crate::{common::*, utils::RateCounter};
use async_std::{fs::File, io::BufWriter};
use std::future::Future;

pub use logging_message::*;
pub use logging_worker::*;

mod logging_worker {
    use super::*;

    /// The data logging worker.
    #[derive(Debug)]
    pub struct LoggingWorker {
        image_dir: PathBuf,
        event_writer: EventWriter<BufWriter<File>>,
        rate_counter: RateCounter,
        rx: mpsc::UnboundedReceiver<LoggingMessage>,
    }

    impl LoggingWorker {
        /// Create a data logging worker.
        async fn new(
            logging_dir: Arc<Path>,
            rx: mpsc::UnboundedReceiver<LoggingMessage>,
        ) -> Result<Self> {
            // prepare dirs
            let event_dir = logging_dir.join("events");
            let image_dir = logging_dir.join("images");
            let event_path_prefix = event_dir
                .join("leaf-dl")
                .into_os_string()
                .into_string()
                .map_err(|path| format_err!("non-UTF-8 event path {:?}", path))?;

            tokio::fs::create_dir_all(&event_dir).await?;
            tokio::fs::create_dir_all(&image_dir).await?;

            let event_writer = EventWriterInit::default()
                .from_prefix_async(event_path_prefix, None)
                .await?;
            let rate_counter = RateCounter::with_second_intertal();

            Ok(Self {
                image_dir,
                event_writer,
                rate_counter,
                rx,
            })
        }

        /// Start the data logging worker. It ends when every sender is dropped.
        async fn start(mut self) -> Result<()> {
            while let Some(LoggingMessage { tag, kind }) = self.rx.recv().await {
                self.rate_counter.add(1.0);

                match kind {
                    LoggingMessageKind::Scalar { step, value } => {
                        self.event_writer
                            .write_scalar_async(tag.as_ref(), step as i64, value as f32)
                            .await?;
                    }
                    LoggingMessageKind::Image { image } => {
                        self.log_image(&tag, image).await?;
                    }
                }

                if let Some(rate) = self.rate_counter.rate() {
                    debug!("processed {:.2} events/s", rate);
                }
            }

            self.event_writer.flush_async().await?;
            Ok(())
        }

        async fn log_image(&mut self, tag: &str, image: RgbImage) -> Result<()> {
            let file_name = format!("{}.png", tag.replace('/', "_"));
            let path = self.image_dir.join(file_name);
            tokio::task::spawn_blocking(move || {
                image
                    .save(&path)
                    .with_context(|| format!("failed to write image '{}'", path.display()))
            })
            .await??;
            Ok(())
        }
    }

    pub async fn logging_worker(
        logging_dir: Arc<Path>,
        rx: mpsc::UnboundedReceiver<LoggingMessage>,
    ) -> Result<impl Future<Output = Result<()>> + Send> {
        let worker = LoggingWorker::new(logging_dir, rx).await?;
        Ok(tokio::task::spawn(worker.start()).map(|result| Fallible::Ok(result??)))
    }
}

mod logging_message {
    use super::*;

    /// The message type that is accepted by the logging worker.
    #[derive(Debug, Clone)]
    pub struct LoggingMessage {
        pub tag: Cow<'static, str>,
        pub kind: LoggingMessageKind,
    }

    impl LoggingMessage {
        pub fn new_scalar<S>(tag: S, step: usize, value: f64) -> Self
        where
            S: Into<Cow<'static, str>>,
        {
            Self {
                tag: tag.into(),
                kind: LoggingMessageKind::Scalar { step, value },
            }
        }

        pub fn new_image<S>(tag: S, image: RgbImage) -> Self
        where
            S: Into<Cow<'static, str>>,
        {
            Self {
                tag: tag.into(),
                kind: LoggingMessageKind::Image { image },
            }
        }
    }

    #[derive(Debug, Clone)]
    pub enum LoggingMessageKind {
        Scalar { step: usize, value: f64 },
        Image { image: RgbImage },
    }
}

/// Sends metrics to the logging worker.
#[derive(Debug, Clone)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<LoggingMessage>,
}

impl MetricsSink {
    pub fn new(tx: mpsc::UnboundedSender<LoggingMessage>) -> Self {
        Self { tx }
    }

    pub fn scalar<S>(&self, tag: S, step: usize, value: f64) -> Result<()>
    where
        S: Into<Cow<'static, str>>,
    {
        self.send(LoggingMessage::new_scalar(tag, step, value))
    }

    pub fn image<S>(&self, tag: S, image: RgbImage) -> Result<()>
    where
        S: Into<Cow<'static, str>>,
    {
        self.send(LoggingMessage::new_image(tag, image))
    }

    fn send(&self, msg: LoggingMessage) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_err| format_err!("cannot send message to logger"))
    }
}
