//! Pipeline stages and the collaborators behind them.
//!
//! Each submodule owns one concern: a trait the orchestrator calls through,
//! plus the default implementation. Swapping OCR engines or catalogs means
//! passing a different adapter, never editing another stage.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ workspace ──▶ region ──▶ ocr ──▶ matching ──▶ export ──┬─▶ store (writer)
//! (check)    (tempdir)     (crop)   (text)   (rank)      (verdict)  └─▶ encode ─▶ store
//! ```
//!
//! 1. [`input`]: validate that the source is a readable PNG or JPEG
//! 2. [`workspace`]: create and remove the job's working directory
//! 3. [`region`]: crop the four regions out of the photograph; runs in
//!    `spawn_blocking` because decoding is CPU-bound
//! 4. [`ocr`]: read each crop with an OCR engine and clean the text
//! 5. [`matching`]: rank catalog names and type lines against the text
//! 6. [`export`]: confirm the best name or report the candidate sets
//! 7. [`encode`]: base64 the crops for the manual-review record
//! 8. [`store`]: persist review records and confirmed output

pub mod encode;
pub mod export;
pub mod input;
pub mod matching;
pub mod ocr;
pub mod region;
pub mod store;
pub mod workspace;
