use std::ffi::CString;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, SendTimeoutError, Sender};
use leptess::tesseract::TessApi;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use tesseract_plumbing::TessBaseApi;
use tracing::{debug, info, warn};

use crate::error::OcrError;

const PSM_SINGLE_WORD: &str = "8";
const PSM_SINGLE_LINE: &str = "7";

/// Text recognition on a single channel image.
///
/// No promise on correctness, only that the call returns.
pub trait OcrEngine {
    fn recognize_text(
        &mut self,
        image: &Mat,
        whitelist: &str,
        single_word: bool,
    ) -> Result<String, OcrError>;
}

pub struct TesseractOcr {
    api: TessApi,
    whitelist: Option<String>,
    single_word: Option<bool>,
}

impl TesseractOcr {
    pub fn new(data_path: Option<&str>, language: &str) -> Result<Self, OcrError> {
        info!(
            "Initializing Tesseract, language {} from {}",
            language,
            data_path.unwrap_or("the default tessdata")
        );
        let api = TessApi::new(data_path, language).map_err(|e| OcrError::Init(format!("{:?}", e)))?;
        Ok(Self {
            api,
            whitelist: None,
            single_word: None,
        })
    }

    fn configure(&mut self, whitelist: &str, single_word: bool) -> Result<(), OcrError> {
        if self.whitelist.as_deref() != Some(whitelist) {
            set_variable(&mut self.api.raw, "tessedit_char_whitelist", whitelist)?;
            self.whitelist = Some(whitelist.to_string());
        }
        if self.single_word != Some(single_word) {
            let mode = if single_word {
                PSM_SINGLE_WORD
            } else {
                PSM_SINGLE_LINE
            };
            set_variable(&mut self.api.raw, "tessedit_pageseg_mode", mode)?;
            self.single_word = Some(single_word);
        }
        Ok(())
    }
}

fn set_variable(raw: &mut TessBaseApi, name: &str, value: &str) -> Result<(), OcrError> {
    let name_cstr = CString::new(name).map_err(|e| OcrError::Configure(e.to_string()))?;
    let value_cstr = CString::new(value).map_err(|e| OcrError::Configure(e.to_string()))?;
    raw.set_variable(&name_cstr, &value_cstr)
        .map_err(|e| OcrError::Configure(format!("{} = {}: {:?}", name, value, e)))
}

impl OcrEngine for TesseractOcr {
    fn recognize_text(
        &mut self,
        image: &Mat,
        whitelist: &str,
        single_word: bool,
    ) -> Result<String, OcrError> {
        self.configure(whitelist, single_word)?;

        if image.channels() != 1 {
            return Err(OcrError::Recognize(format!(
                "expected a single channel image, got {} channels",
                image.channels()
            )));
        }
        // Tesseract reads rows back to back
        let contiguous;
        let image = if image.is_continuous() {
            image
        } else {
            contiguous = image.clone();
            &contiguous
        };

        let cols = image.cols();
        let rows = image.rows();
        let bytes = image
            .data_bytes()
            .map_err(|e| OcrError::Recognize(e.to_string()))?;
        self.api
            .raw
            .set_image(bytes, cols, rows, 1, cols)
            .map_err(|e| OcrError::Recognize(format!("{:?}", e)))?;

        let text = self
            .api
            .get_utf8_text()
            .map_err(|e| OcrError::Recognize(format!("{:?}", e)))?;
        debug!("Tesseract read {:?} from {}x{}", text.trim(), cols, rows);
        Ok(text)
    }
}

struct OcrRequest {
    image: Mat,
    whitelist: String,
    single_word: bool,
    reply: Sender<Result<String, OcrError>>,
}

type StartWorker = dyn Fn() -> Result<Sender<OcrRequest>, OcrError> + Send + Sync;

/// Runs an engine on its own thread and gives up waiting after `timeout`.
///
/// The engine is built on the worker thread, so engines that cannot move
/// between threads (Tesseract) work too. A worker that misses the deadline is
/// abandoned with its request and a fresh one is started, so the next call
/// never queues behind a stuck one.
pub struct TimeoutOcr {
    start_worker: Box<StartWorker>,
    requests: Sender<OcrRequest>,
    timeout: Duration,
}

impl TimeoutOcr {
    /// `make_engine` runs once per worker, again after every timeout.
    pub fn spawn<E, F>(make_engine: F, timeout: Duration) -> Result<Self, OcrError>
    where
        E: OcrEngine + 'static,
        F: Fn() -> Result<E, OcrError> + Send + Sync + 'static,
    {
        let make_engine = Arc::new(make_engine);
        let start_worker: Box<StartWorker> = Box::new(move || launch_worker(make_engine.clone()));
        let requests = start_worker()?;
        Ok(Self {
            start_worker,
            requests,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn restart_worker(&mut self) {
        match (self.start_worker)() {
            Ok(requests) => {
                info!("Replaced the stuck OCR worker");
                // the old worker exits once its current call returns
                self.requests = requests;
            }
            Err(e) => warn!("Could not start a new OCR worker: {}", e),
        }
    }
}

fn launch_worker<E, F>(make_engine: Arc<F>) -> Result<Sender<OcrRequest>, OcrError>
where
    E: OcrEngine + 'static,
    F: Fn() -> Result<E, OcrError> + Send + Sync + 'static,
{
    let (requests, inbox) = channel::bounded::<OcrRequest>(1);
    let (ready_s, ready_r) = channel::bounded(1);

    thread::Builder::new()
        .name("ocr-worker".to_string())
        .spawn(move || {
            let mut engine = match (*make_engine)() {
                Ok(engine) => {
                    let _ = ready_s.send(Ok(()));
                    engine
                }
                Err(e) => {
                    let _ = ready_s.send(Err(e));
                    return;
                }
            };
            for request in inbox {
                let result =
                    engine.recognize_text(&request.image, &request.whitelist, request.single_word);
                // nobody waits for requests that timed out
                let _ = request.reply.send(result);
            }
            debug!("OCR worker stopped");
        })
        .map_err(|e| OcrError::Init(e.to_string()))?;

    ready_r.recv().map_err(|_| OcrError::WorkerGone)??;
    Ok(requests)
}

impl OcrEngine for TimeoutOcr {
    fn recognize_text(
        &mut self,
        image: &Mat,
        whitelist: &str,
        single_word: bool,
    ) -> Result<String, OcrError> {
        let (reply, answer) = channel::bounded(1);
        self.requests
            .send_timeout(
                OcrRequest {
                    image: image.clone(),
                    whitelist: whitelist.to_string(),
                    single_word,
                    reply,
                },
                self.timeout,
            )
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => OcrError::Timeout(self.timeout),
                SendTimeoutError::Disconnected(_) => OcrError::WorkerGone,
            })?;

        match answer.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!("OCR gave no answer within {:?}", self.timeout);
                self.restart_worker();
                Err(OcrError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(OcrError::WorkerGone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC1};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoSize;

    impl OcrEngine for EchoSize {
        fn recognize_text(&mut self, image: &Mat, _: &str, _: bool) -> Result<String, OcrError> {
            Ok(format!("{}X{}", image.cols(), image.rows()))
        }
    }

    struct Sleepy(Duration);

    impl OcrEngine for Sleepy {
        fn recognize_text(&mut self, _: &Mat, _: &str, _: bool) -> Result<String, OcrError> {
            thread::sleep(self.0);
            Ok("LATE1234".to_string())
        }
    }

    fn patch() -> Mat {
        Mat::new_rows_cols_with_default(12, 34, CV_8UC1, Scalar::all(255.0)).unwrap()
    }

    #[test]
    fn test_worker_answers_in_time() {
        let mut ocr = TimeoutOcr::spawn(|| Ok(EchoSize), Duration::from_secs(5)).unwrap();
        assert_eq!(ocr.recognize_text(&patch(), "AB", true).unwrap(), "34X12");
        assert_eq!(ocr.recognize_text(&patch(), "AB", false).unwrap(), "34X12");
    }

    #[test]
    fn test_slow_engine_times_out() {
        let mut ocr = TimeoutOcr::spawn(
            || Ok(Sleepy(Duration::from_millis(300))),
            Duration::from_millis(20),
        )
        .unwrap();
        assert_eq!(
            ocr.recognize_text(&patch(), "AB", true),
            Err(OcrError::Timeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn test_engine_init_failure_is_reported() {
        let result = TimeoutOcr::spawn(
            || -> Result<EchoSize, OcrError> { Err(OcrError::Init("no tessdata".to_string())) },
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(OcrError::Init(msg)) if msg == "no tessdata"));
    }

    /// Slow only on the very first call across every engine it builds.
    struct SlowFirst {
        calls: Arc<AtomicUsize>,
    }

    impl OcrEngine for SlowFirst {
        fn recognize_text(&mut self, _: &Mat, _: &str, _: bool) -> Result<String, OcrError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                thread::sleep(Duration::from_millis(500));
            }
            Ok("KA01AB1234".to_string())
        }
    }

    #[test]
    fn test_call_after_a_timeout_is_not_stuck_behind_it() {
        let calls = Arc::new(AtomicUsize::new(0));
        let built = Arc::new(AtomicUsize::new(0));
        let (engine_calls, engine_built) = (calls.clone(), built.clone());
        let mut ocr = TimeoutOcr::spawn(
            move || {
                engine_built.fetch_add(1, Ordering::SeqCst);
                Ok(SlowFirst {
                    calls: engine_calls.clone(),
                })
            },
            Duration::from_millis(100),
        )
        .unwrap();

        assert_eq!(
            ocr.recognize_text(&patch(), "AB", true),
            Err(OcrError::Timeout(Duration::from_millis(100)))
        );
        assert_eq!(ocr.recognize_text(&patch(), "AB", true).unwrap(), "KA01AB1234");
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
