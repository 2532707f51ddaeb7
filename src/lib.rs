// Library root
// -----------
// Everything the `syft-deploy` binary does lives here so it can be tested
// without a terminal or a live service. `main.rs` only parses arguments,
// builds the pieces and prints.
//
// Module responsibilities:
// - `api`: HTTP client for the dataset/endpoint service and the `Remote`
//   trait the operations are written against.
// - `batch`: the resumable driver (resume, dry run, limit, throttle, retry).
// - `ledger`: the on-disk progress record the driver reads and writes.
// - `ops`: what each batch command does to a single item.
// - `slug`: name and slug sanitization.
// - `discovery`: local dataset directories and description files.
// - `describe`: AI-generated descriptions through a completion API.
// - `config`: TOML file, environment and flag resolution.
// - `error`: typed errors shared by the above.
// - `ui`: progress bar, prompts and summaries.
pub mod api;
pub mod batch;
pub mod config;
pub mod describe;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod ops;
pub mod slug;
pub mod ui;
