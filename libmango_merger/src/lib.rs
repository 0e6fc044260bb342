//! # mango_merger
//!
//! mango_merger prepares MANGO detector runs for analysis. Every run of the detector is
//! reconstructed into one event file (`reco_run<N>_3D.h5`). The merger reads the run
//! logbook, attaches the run conditions and the environmental readings closest to the
//! start of each run to the event files, and concatenates the files of runs taken under
//! the same conditions (source position and drift field) into one file per condition.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### HDF5
//!
//! Before building and running mango_merger, HDF5 must be installed. Typically this will
//! be installed using a package manager (homebrew, apt, etc), and the Rust libraries will
//! auto detect the location of the HDF install. If it lives in a custom location, write
//! the following snippet into the file `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./mango_merger_cli` from the
//! top level repository.
//!
//! ### Merge tool
//!
//! The merger does not concatenate event files itself. It calls an external tool once per
//! group as `<merge_tool> <merge_tool_args...> <destination> <source_1> ... <source_n>`
//! and expects a zero exit status on success.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! logbook:
//!   path: /data/logbook/data_runs.csv
//!   delimiter: ','
//!   filter:
//!     column: run_description
//!     marker: HOLE
//!   on_malformed: skip
//!   layout:
//!     kind: run_list
//!     run_number_column: run_number
//!     start_time_column: start_time
//!     drift_field_column: DRIFT_V
//!     position_column: null
//!     description_column: run_description
//! source_folder: /data/reco
//! target_folder: /data/merged
//! merge_tool: hadd
//! merge_tool_args: ['-f']
//! file_extension: h5
//! summary_path: /data/merged/summary.csv
//! env_log:
//!   path: /data/env/keg_history.txt
//!   format:
//!     kind: facility_monitor
//!     skip_rows: 8
//!     field_names: [KEG_temp, KEG_pressure, KEG_humidity, KEG_voc]
//!     timestamp_format: day_first
//! query_time_format: day_first
//! annotation:
//!   enabled: true
//!   stage: before_merge
//!   mode:
//!     kind: branch
//!     tree: Events
//!   on_existing: skip
//! merge: true
//! clean_target: false
//! ```
//!
//! The logbook `layout` is either `run_list` (one row per run with a start time) or
//! `range_sheet` (one row per block of runs with hand-typed sensor readings and gas
//! ratio). The environmental log `format` is either `bench_sensor` (delimited text with a
//! header, `day/month/year_hour-minute-second` timestamps) or `facility_monitor` (tab
//! separated history export). If `env_log` is null only logbook fields are attached.
//!
//! Annotation `mode` is `branch` (one column per field on the event tree, value repeated
//! for every event) or `aux_table` (a single-row table, `OtherParam` by default). With
//! `stage: after_merge` the merged files in the target folder are annotated instead of the
//! per-run files, with only the logbook fields that all runs of the group agree on.
//!
//! ## Output
//!
//! ### Event file format
//!
//! ```text
//! reco_run101_3D.h5
//! Events
//! |---- <column>(dset)        one entry per event
//! |---- DRIFT_V(dset)         added by the merger, branch mode
//! |---- HOLE_number(dset)
//! OtherParam                  added by the merger, aux_table mode
//! |---- <field>(dset)         one entry
//! ```
//!
//! Merged files are named `reco_run<first>-<last>_3D.h5` after the lowest and highest run
//! of the group. Missing values are written as 0.0.
pub mod annotation;
pub mod annotator;
pub mod cleanup;
pub mod config;
pub mod env_log;
pub mod error;
pub mod event_file;
pub mod logbook;
pub mod matcher;
pub mod merge_exec;
pub mod merge_plan;
pub mod process;
pub mod run_record;
pub mod timestamp;
pub mod worker_status;
