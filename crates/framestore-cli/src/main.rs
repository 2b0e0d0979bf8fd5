//! CLI tool for inspecting and maintaining framestore containers.

mod error;
mod predicate;
mod render;

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatchReader;
use clap::{Parser, Subcommand};
use framestore::expr::Predicate;
use framestore::prelude::*;
use framestore::{Complib, IndexKind};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::{OptionExt, ResultExt};

use crate::error::{
    ArrowSnafu, CliResult, CopySnafu, FrameSnafu, IndexColumnMissingSnafu, InvalidOptionSnafu,
    OpenStoreSnafu, ParquetMissingSnafu, ParquetReadSnafu, StoreSnafu,
};
use crate::predicate::parse_where;
use crate::render::render;

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a Parquet file into the store under a key
    Import {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        key: String,

        #[arg(long)]
        parquet: PathBuf,

        /// fixed or table (default: fixed for put, table with --append)
        #[arg(long)]
        format: Option<String>,

        /// Append to an existing table instead of replacing the key
        #[arg(long, default_value_t = false)]
        append: bool,

        /// Use this column as the row index instead of row positions
        #[arg(long = "index-column")]
        index_column: Option<String>,

        /// Repeatable data column names
        #[arg(long = "data-column")]
        data_columns: Vec<String>,
    },

    /// List object keys
    Keys {
        #[arg(long)]
        store: PathBuf,
    },

    /// Summarize every object in the store
    Info {
        #[arg(long)]
        store: PathBuf,
    },

    /// Read rows from an object
    Select {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        key: String,

        /// e.g. "index >= 50 & sym == 'a'"
        #[arg(long = "where")]
        predicate: Option<String>,

        /// Repeatable column names
        #[arg(long = "column")]
        columns: Vec<String>,

        #[arg(long)]
        start: Option<i64>,

        #[arg(long)]
        stop: Option<i64>,

        /// Read and print the selection in chunks of this many rows
        #[arg(long)]
        chunksize: Option<usize>,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Remove an object, or the rows of a table matching a predicate or range
    Remove {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        key: String,

        #[arg(long = "where")]
        predicate: Option<String>,

        #[arg(long)]
        start: Option<i64>,

        #[arg(long)]
        stop: Option<i64>,
    },

    /// Copy objects into another store, rebuilding tables and their indexes
    Copy {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        dest: PathBuf,

        /// Repeatable keys to copy (default: all)
        #[arg(long = "key")]
        keys: Vec<String>,

        /// Destination open mode: a or w
        #[arg(long, default_value = "w")]
        mode: String,

        #[arg(long)]
        complib: Option<String>,

        #[arg(long)]
        complevel: Option<u8>,

        /// Do not rebuild the source indexes
        #[arg(long, default_value_t = false)]
        no_propindexes: bool,

        /// Keep keys that already exist in the destination
        #[arg(long, default_value_t = false)]
        keep_existing: bool,
    },

    /// Build secondary indexes on a table
    CreateIndex {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        key: String,

        /// Repeatable field names (default: every queryable field)
        #[arg(long = "column")]
        columns: Vec<String>,

        /// ultralight, light, medium or full
        #[arg(long, default_value = "medium")]
        kind: String,

        #[arg(long, default_value_t = 6)]
        optlevel: u8,
    },
}

#[derive(Debug, Parser)]
#[command(name = "framestore", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn open_store(path: &Path, mode: OpenMode) -> CliResult<Store> {
    Store::open(path, StoreOptions::with_mode(mode)).context(OpenStoreSnafu {
        path: path.display().to_string(),
    })
}

fn parse_option<T>(flag: &'static str, value: &str) -> CliResult<T>
where
    T: std::str::FromStr<Err = framestore::ParseOptionError>,
{
    value.parse::<T>().context(InvalidOptionSnafu {
        flag,
        value: value.to_string(),
    })
}

fn predicate_of(predicate: Option<&str>) -> CliResult<Option<Predicate>> {
    predicate
        .map(|p| parse_where(p).map(Predicate::from))
        .transpose()
}

fn read_parquet(path: &Path, index_column: Option<&str>) -> CliResult<Frame> {
    let display = path.display().to_string();
    let file = File::open(path).context(ParquetMissingSnafu { path: &display })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context(ParquetReadSnafu { path: &display })?
        .build()
        .context(ParquetReadSnafu { path: &display })?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(ArrowSnafu { path: &display })?;
    let batch = concat_batches(&schema, &batches).context(ArrowSnafu { path: &display })?;

    if let Some(column) = index_column {
        schema.column_with_name(column).context(IndexColumnMissingSnafu {
            column,
            path: &display,
        })?;
    }
    let mut index = Index::range(batch.num_rows());
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, values) in schema.fields().iter().zip(batch.columns()) {
        if Some(field.name().as_str()) == index_column {
            index = Index::named(values.clone(), field.name().clone());
        } else {
            columns.push((field.name().clone(), values.clone()));
        }
    }
    Frame::from_columns(index, columns).context(FrameSnafu)
}

struct ImportArgs {
    store: PathBuf,
    key: String,
    parquet: PathBuf,
    format: Option<String>,
    append: bool,
    index_column: Option<String>,
    data_columns: Vec<String>,
}

fn cmd_import(args: ImportArgs) -> CliResult<()> {
    let frame = read_parquet(&args.parquet, args.index_column.as_deref())?;
    let nrows = frame.nrows();
    let opts = PutOptions {
        format: match (args.format.as_deref(), args.append) {
            (Some(f), _) => Some(parse_option("format", f)?),
            (None, true) => Some(Format::Table),
            (None, false) => None,
        },
        append: args.append,
        data_columns: (!args.data_columns.is_empty())
            .then(|| DataColumns::Named(args.data_columns.clone())),
        ..PutOptions::default()
    };
    let mut store = open_store(&args.store, OpenMode::Append)?;
    store.put(&args.key, frame, opts).context(StoreSnafu {
        action: "import",
        key: &args.key,
    })?;
    println!("Imported {nrows} rows into {}", args.key);
    Ok(())
}

fn cmd_keys(store: &Path) -> CliResult<()> {
    let store = open_store(store, OpenMode::Read)?;
    let keys = store.keys().context(StoreSnafu {
        action: "list",
        key: "/",
    })?;
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

fn cmd_info(store: &Path) -> CliResult<()> {
    let store = open_store(store, OpenMode::Read)?;
    let info = store.info().context(StoreSnafu {
        action: "info",
        key: "/",
    })?;
    println!("{}", info.trim_end());
    Ok(())
}

struct SelectArgs {
    store: PathBuf,
    key: String,
    predicate: Option<String>,
    columns: Vec<String>,
    start: Option<i64>,
    stop: Option<i64>,
    chunksize: Option<usize>,
    max_rows: usize,
}

fn cmd_select(args: SelectArgs) -> CliResult<()> {
    let mut opts = SelectOptions {
        predicate: predicate_of(args.predicate.as_deref())?,
        start: args.start,
        stop: args.stop,
        ..SelectOptions::default()
    };
    if !args.columns.is_empty() {
        opts = opts.columns(args.columns.iter().map(String::as_str));
    }
    let mut store = open_store(&args.store, OpenMode::Read)?;
    let Some(chunksize) = args.chunksize else {
        let data = store.select(&args.key, opts).context(StoreSnafu {
            action: "select",
            key: &args.key,
        })?;
        print!("{}", render(&data, args.max_rows)?);
        return Ok(());
    };

    let chunks = store
        .select_chunks(&args.key, opts.chunked(chunksize))
        .context(StoreSnafu {
            action: "select",
            key: &args.key,
        })?;
    for (i, chunk) in chunks.enumerate() {
        let chunk = chunk.context(StoreSnafu {
            action: "select",
            key: &args.key,
        })?;
        println!("chunk {i}");
        print!("{}", render(&chunk, args.max_rows)?);
    }
    Ok(())
}

fn cmd_remove(
    store: &Path,
    key: &str,
    predicate: Option<&str>,
    start: Option<i64>,
    stop: Option<i64>,
) -> CliResult<()> {
    let predicate = predicate_of(predicate)?;
    let mut store = open_store(store, OpenMode::ReadWrite)?;
    let removed = store
        .remove(key, predicate.as_ref(), start, stop)
        .context(StoreSnafu {
            action: "remove",
            key,
        })?;
    match removed {
        Some(rows) => println!("Removed {rows} rows from {key}"),
        None => println!("Removed {key}"),
    }
    Ok(())
}

struct CopyArgs {
    store: PathBuf,
    dest: PathBuf,
    keys: Vec<String>,
    mode: String,
    complib: Option<String>,
    complevel: Option<u8>,
    no_propindexes: bool,
    keep_existing: bool,
}

fn cmd_copy(args: CopyArgs) -> CliResult<()> {
    let opts = CopyOptions {
        mode: parse_option("mode", &args.mode)?,
        propindexes: !args.no_propindexes,
        keys: (!args.keys.is_empty()).then_some(args.keys),
        complib: args
            .complib
            .as_deref()
            .map(|c| parse_option::<Complib>("complib", c))
            .transpose()?,
        complevel: args.complevel,
        overwrite: !args.keep_existing,
    };
    let store = open_store(&args.store, OpenMode::Read)?;
    let dest = args.dest.display().to_string();
    let copied = store
        .copy(&args.dest, opts)
        .context(CopySnafu { dest: &dest })?;
    let n = copied.len().context(CopySnafu { dest: &dest })?;
    println!("Copied {n} objects into {dest}");
    Ok(())
}

fn cmd_create_index(
    store: &Path,
    key: &str,
    columns: Vec<String>,
    kind: &str,
    optlevel: u8,
) -> CliResult<()> {
    let opts = IndexOptions {
        columns: (!columns.is_empty()).then_some(columns),
        optlevel,
        kind: parse_option::<IndexKind>("kind", kind)?,
    };
    let mut store = open_store(store, OpenMode::ReadWrite)?;
    store.create_table_index(key, opts).context(StoreSnafu {
        action: "create-index",
        key,
    })?;
    println!("Indexed {key}");
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Import {
            store,
            key,
            parquet,
            format,
            append,
            index_column,
            data_columns,
        } => cmd_import(ImportArgs {
            store,
            key,
            parquet,
            format,
            append,
            index_column,
            data_columns,
        }),

        Command::Keys { store } => cmd_keys(&store),

        Command::Info { store } => cmd_info(&store),

        Command::Select {
            store,
            key,
            predicate,
            columns,
            start,
            stop,
            chunksize,
            max_rows,
        } => cmd_select(SelectArgs {
            store,
            key,
            predicate,
            columns,
            start,
            stop,
            chunksize,
            max_rows,
        }),

        Command::Remove {
            store,
            key,
            predicate,
            start,
            stop,
        } => cmd_remove(&store, &key, predicate.as_deref(), start, stop),

        Command::Copy {
            store,
            dest,
            keys,
            mode,
            complib,
            complevel,
            no_propindexes,
            keep_existing,
        } => cmd_copy(CopyArgs {
            store,
            dest,
            keys,
            mode,
            complib,
            complevel,
            no_propindexes,
            keep_existing,
        }),

        Command::CreateIndex {
            store,
            key,
            columns,
            kind,
            optlevel,
        } => cmd_create_index(&store, &key, columns, &kind, optlevel),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
