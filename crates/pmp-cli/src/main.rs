#![forbid(unsafe_code)]

mod options;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use options::{Flag, INFO_RULES};
use pmp_btt::{ArenaPlan, is_sector_size_acceptable, max_internal_sector_size, plan_arena};
use pmp_core::{
    ArenaInfo, CheckOptions, CheckReport, FlogPair, InspectConfig, PersistHooks, PoolFile,
    PoolParams, PoolPayload, Verdict, check_pool, hooks_for, probe, read_arena_info, read_flog,
};
use pmp_ondisk::{BlockPoolHeader, LogPoolHeader, OnDisk, PoolHeader, verify};
use pmp_range::{Range, RangeSet};
use pmp_types::{PoolType, parse_size, trim_nul_padded};
use serde::Serialize;
use std::env::VarError;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    const ENV_KEY: &'static str = "PMEMPOOL_LOG_FORMAT";

    fn parse(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true).map_err(|_| {
            anyhow::anyhow!(
                "invalid {key}={raw:?}; expected one of: human, json",
                key = Self::ENV_KEY
            )
        })
    }

    fn from_env() -> Result<Option<Self>> {
        match std::env::var(Self::ENV_KEY) {
            Ok(value) => Ok(Some(Self::parse(&value)?)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                bail!("{key} contains non-UTF-8 bytes", key = Self::ENV_KEY)
            }
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(log_format_override: Option<LogFormat>) -> Result<LogFormat> {
    let format = log_format_override
        .or(LogFormat::from_env()?)
        .unwrap_or(LogFormat::Human);

    match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize human logger: {err}"))?,
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize JSON logger: {err}"))?,
    }

    Ok(format)
}

fn parse_size_arg(raw: &str) -> std::result::Result<u64, String> {
    parse_size(raw).map_err(|err| err.to_string())
}

fn parse_pool_type_arg(raw: &str) -> std::result::Result<PoolType, String> {
    raw.parse::<PoolType>().map_err(|err| err.to_string())
}

#[derive(Parser)]
#[command(
    name = "pmempool-inspect",
    about = "Inspect, check and plan persistent-memory pool files"
)]
struct Cli {
    /// Log output format (`human` or `json`).
    ///
    /// Precedence: `--log-format` > `PMEMPOOL_LOG_FORMAT` > `human`.
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,
    /// Trace persistence hooks around every write.
    ///
    /// Precedence: `--instrument` > `PMEMPOOL_INSTRUMENT` > off.
    #[arg(long, global = true)]
    instrument: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show pool parameters and metadata.
    Info {
        /// Path to the pool file.
        pool: PathBuf,
        /// Expected pool type (`blk`, `log` or `obj`).
        #[arg(long = "type", value_parser = parse_pool_type_arg)]
        pool_type: Option<PoolType>,
        /// Include the first BTT arena's info block (blk only).
        #[arg(long, short = 'b')]
        btt: bool,
        /// Include BTT flog pairs (requires --btt).
        #[arg(long, short = 'f')]
        flog: bool,
        /// Flog pair indices to show, e.g. `0-3,10` (requires --flog).
        #[arg(long)]
        range: Option<String>,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Verify pool metadata checksums and geometry.
    Check {
        /// Path to the pool file.
        pool: PathBuf,
        /// Write corrected checksums back to the pool.
        #[arg(long, short = 'r')]
        repair: bool,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Hex dump selected byte ranges of a pool file.
    Dump {
        /// Path to the pool file.
        pool: PathBuf,
        /// Byte ranges, e.g. `0-4K,8K-` (default: whole file).
        #[arg(long)]
        range: Option<String>,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Compute BTT arena geometry for a pool file size.
    Plan {
        /// File size, with optional K/M/G/T/P suffix.
        #[arg(value_parser = parse_size_arg)]
        size: u64,
        /// Block size to compare against the capacity limit.
        #[arg(long, value_parser = parse_size_arg)]
        bsize: Option<u64>,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    const fn name(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::Check { .. } => "check",
            Self::Dump { .. } => "dump",
            Self::Plan { .. } => "plan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InfoSections(u8);

impl InfoSections {
    const BTT: u8 = 1 << 0;
    const FLOG: u8 = 1 << 1;

    const fn empty() -> Self {
        Self(0)
    }

    const fn with_btt(mut self, enabled: bool) -> Self {
        if enabled {
            self.0 |= Self::BTT;
        }
        self
    }

    const fn with_flog(mut self, enabled: bool) -> Self {
        if enabled {
            self.0 |= Self::FLOG;
        }
        self
    }

    const fn btt(self) -> bool {
        self.0 & Self::BTT != 0
    }

    const fn flog(self) -> bool {
        self.0 & Self::FLOG != 0
    }
}

#[derive(Debug, Clone)]
struct InfoCommandOptions {
    type_hint: Option<PoolType>,
    sections: InfoSections,
    range: Option<String>,
    json: bool,
}

impl InfoCommandOptions {
    fn given_flags(&self) -> Vec<Flag> {
        let mut flags = Vec::new();
        if self.sections.btt() {
            flags.push(Flag::Btt);
        }
        if self.sections.flog() {
            flags.push(Flag::Flog);
        }
        if self.range.is_some() {
            flags.push(Flag::Range);
        }
        flags
    }
}

// ── Serializable outputs ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    pool_type: PoolType,
    size: u64,
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<HeaderOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<BlockOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<LogOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    object: Option<ObjectOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    btt: Option<BttSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flog: Option<Vec<FlogPair>>,
}

#[derive(Debug, Serialize)]
struct HeaderOutput {
    signature: String,
    major: u32,
    compat_features: u32,
    incompat_features: u32,
    ro_compat_features: u32,
    uuid: String,
    crtime: u64,
    checksum: String,
    checksum_valid: bool,
    unused_zeroed: bool,
}

#[derive(Debug, Serialize)]
struct BlockOutput {
    bsize: u32,
    is_zeroed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_internal_lbasize: Option<u64>,
}

#[derive(Debug, Serialize)]
struct LogOutput {
    start_offset: u64,
    end_offset: u64,
    write_offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    used_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ObjectOutput {
    layout: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
enum BttSection {
    Absent,
    Present(BttOutput),
}

#[derive(Debug, Serialize)]
struct BttOutput {
    offset: u64,
    signature_valid: bool,
    checksum: String,
    checksum_valid: bool,
    uuid: String,
    parent_uuid: String,
    flags: u32,
    major: u16,
    minor: u16,
    external_lbasize: u32,
    external_nlba: u32,
    internal_lbasize: u32,
    internal_nlba: u32,
    nfree: u32,
    infosize: u32,
    nextoff: u64,
    dataoff: u64,
    mapoff: u64,
    flogoff: u64,
    infooff: u64,
}

impl BttOutput {
    fn from_arena(arena: &ArenaInfo) -> Self {
        let info = &arena.info;
        Self {
            offset: arena.offset,
            signature_valid: info.has_valid_signature(),
            checksum: format!("{:#018x}", arena.checksum.stored),
            checksum_valid: arena.checksum.valid,
            uuid: format_uuid(&info.uuid),
            parent_uuid: format_uuid(&info.parent_uuid),
            flags: info.flags,
            major: info.major,
            minor: info.minor,
            external_lbasize: info.external_lbasize,
            external_nlba: info.external_nlba,
            internal_lbasize: info.internal_lbasize,
            internal_nlba: info.internal_nlba,
            nfree: info.nfree,
            infosize: info.infosize,
            nextoff: info.nextoff,
            dataoff: info.dataoff,
            mapoff: info.mapoff,
            flogoff: info.flogoff,
            infooff: info.infooff,
        }
    }
}

#[derive(Debug, Serialize)]
struct DumpOutput {
    path: String,
    size: u64,
    ranges: Vec<DumpRangeOutput>,
}

#[derive(Debug, Serialize)]
struct DumpRangeOutput {
    first: u64,
    last: u64,
    hex: String,
}

#[derive(Debug, Serialize)]
struct PlanOutput {
    file_size: u64,
    max_internal_lbasize: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    arena: Option<ArenaPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bsize: Option<u64>,
    /// Literal `bsize >= max_internal_lbasize`.
    #[serde(skip_serializing_if = "Option::is_none")]
    bsize_acceptable: Option<bool>,
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let log_format = init_logging(cli.log_format)?;
    let config = InspectConfig::from_env()
        .context("invalid instrumentation setting")?
        .with_instrument(cli.instrument);
    let hooks = hooks_for(&config);
    let command_name = cli.command.name();
    let run_span = info_span!(
        target: "pmp::cli",
        "command",
        command = command_name,
        log_format = log_format.as_str(),
        instrument = config.instrument
    );
    let _run_guard = run_span.enter();
    let started = Instant::now();

    info!(
        target: "pmp::cli",
        command = command_name,
        log_format = log_format.as_str(),
        hooks = hooks.name(),
        "command_start"
    );

    let result = match cli.command {
        Command::Info {
            pool,
            pool_type,
            btt,
            flog,
            range,
            json,
        } => info_cmd(
            &pool,
            &InfoCommandOptions {
                type_hint: pool_type,
                sections: InfoSections::empty().with_btt(btt).with_flog(flog),
                range,
                json,
            },
        ),
        Command::Check { pool, repair, json } => check_cmd(&pool, repair, json, hooks),
        Command::Dump { pool, range, json } => dump_cmd(&pool, range.as_deref(), json),
        Command::Plan { size, bsize, json } => plan_cmd(size, bsize, json),
    };

    let duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    if let Err(err) = &result {
        error!(
            target: "pmp::cli",
            command = command_name,
            duration_us,
            error = %err,
            "command_failed"
        );
    } else {
        info!(
            target: "pmp::cli",
            command = command_name,
            duration_us,
            "command_succeeded"
        );
    }

    result
}

// ── info ────────────────────────────────────────────────────────────────────

fn info_cmd(path: &Path, options: &InfoCommandOptions) -> Result<()> {
    let command_span = info_span!(
        target: "pmp::cli::info",
        "info",
        pool = %path.display(),
        output_json = options.json
    );
    let _command_guard = command_span.enter();
    let started = Instant::now();
    info!(target: "pmp::cli::info", "info_start");

    let output = info_output(path, options)?;
    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
    } else {
        print_info(&output);
    }

    info!(
        target: "pmp::cli::info",
        pool_type = output.pool_type.as_str(),
        duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "info_complete"
    );
    Ok(())
}

fn info_output(path: &Path, options: &InfoCommandOptions) -> Result<InfoOutput> {
    let params = probe(path).with_context(|| format!("failed to probe pool {}", path.display()))?;
    if let Some(hint) = options.type_hint {
        if hint != params.pool_type {
            bail!(
                "{} is not a {hint} pool (found {})",
                path.display(),
                params.pool_type
            );
        }
    }
    options::validate(INFO_RULES, &options.given_flags(), params.pool_type)?;

    let mut output = InfoOutput {
        path: path.display().to_string(),
        pool_type: params.pool_type,
        size: params.size,
        mode: format!("{:04o}", params.mode),
        header: None,
        block: None,
        log: None,
        object: None,
        btt: None,
        flog: None,
    };
    if !params.pool_type.is_pool() {
        return Ok(output);
    }

    let mut file = PoolFile::open(path)?;
    let raw = file.read_header()?;
    output.header = Some(header_output(&raw)?);
    fill_type_sections(&mut output, &params, &mut file)?;

    if options.sections.btt() {
        let arena = read_arena_info(&mut file)
            .with_context(|| format!("failed to read BTT info of {}", path.display()))?;
        output.btt = Some(match &arena {
            Some(arena) => BttSection::Present(BttOutput::from_arena(arena)),
            None => BttSection::Absent,
        });
        if options.sections.flog() {
            output.flog = Some(match &arena {
                Some(arena) => flog_pairs(&mut file, arena, options.range.as_deref())?,
                None => Vec::new(),
            });
        }
    }
    Ok(output)
}

fn header_output(raw: &[u8]) -> Result<HeaderOutput> {
    let header = PoolHeader::from_disk(raw)?;
    let verdict = verify::<PoolHeader>(raw)?;
    Ok(HeaderOutput {
        signature: trim_nul_padded(&header.signature),
        major: header.major,
        compat_features: header.compat_features,
        incompat_features: header.incompat_features,
        ro_compat_features: header.ro_compat_features,
        uuid: format_uuid(&header.uuid),
        crtime: header.crtime,
        checksum: format!("{:#018x}", verdict.stored),
        checksum_valid: verdict.valid,
        unused_zeroed: header.unused_is_zeroed(),
    })
}

fn fill_type_sections(
    output: &mut InfoOutput,
    params: &PoolParams,
    file: &mut PoolFile,
) -> Result<()> {
    match &params.payload {
        PoolPayload::Block { .. } => {
            let (desc, _) = file.read_struct::<BlockPoolHeader>(0)?;
            output.block = Some(BlockOutput {
                bsize: desc.bsize,
                is_zeroed: desc.is_zeroed != 0,
                max_internal_lbasize: max_internal_sector_size(params.size).ok(),
            });
        }
        PoolPayload::Object { .. } => {
            output.object = Some(ObjectOutput {
                layout: params.layout_name().unwrap_or_default(),
            });
        }
        PoolPayload::None if params.pool_type == PoolType::Log => {
            let (desc, _) = file.read_struct::<LogPoolHeader>(0)?;
            output.log = Some(LogOutput {
                start_offset: desc.start_offset,
                end_offset: desc.end_offset,
                write_offset: desc.write_offset,
                used_bytes: desc.used_bytes(),
            });
        }
        PoolPayload::None => {}
    }
    Ok(())
}

fn flog_pairs(
    file: &mut PoolFile,
    arena: &ArenaInfo,
    range: Option<&str>,
) -> Result<Vec<FlogPair>> {
    let Some(universe) = arena.flog_universe() else {
        return Ok(Vec::new());
    };
    let selection = match range {
        Some(raw) => RangeSet::parse(raw, universe)
            .with_context(|| format!("invalid flog range {raw:?}"))?,
        None => RangeSet::full(universe),
    };
    Ok(read_flog(file, arena, &selection)?)
}

fn print_info(output: &InfoOutput) {
    println!("pmempool-inspect");
    println!("path: {}", output.path);
    println!("pool_type: {}", output.pool_type);
    println!("size: {}", output.size);
    println!("mode: {}", output.mode);

    if let Some(header) = &output.header {
        println!();
        println!("POOL Header:");
        println!("signature: {}", header.signature);
        println!("major: {}", header.major);
        println!(
            "features: compat={:#x} incompat={:#x} ro_compat={:#x}",
            header.compat_features, header.incompat_features, header.ro_compat_features
        );
        println!("uuid: {}", header.uuid);
        println!("crtime: {}", header.crtime);
        println!(
            "checksum: {} [{}]",
            header.checksum,
            if header.checksum_valid { "OK" } else { "wrong" }
        );
        if !header.unused_zeroed {
            println!("WARNING: reserved header area is not zeroed");
        }
    }

    if let Some(block) = &output.block {
        println!();
        println!("PMEM BLK Header:");
        println!("block_size: {}", block.bsize);
        println!("is_zeroed: {}", block.is_zeroed);
        match block.max_internal_lbasize {
            Some(limit) => println!("max_internal_lbasize: {limit}"),
            None => println!("max_internal_lbasize: (file too small for a BTT arena)"),
        }
    }
    if let Some(log) = &output.log {
        println!();
        println!("PMEM LOG Header:");
        println!("start_offset: {:#x}", log.start_offset);
        println!("end_offset: {:#x}", log.end_offset);
        println!("write_offset: {:#x}", log.write_offset);
        match log.used_bytes {
            Some(used) => println!("used: {used}"),
            None => println!("WARNING: write offset outside of log area"),
        }
    }
    if let Some(object) = &output.object {
        println!();
        println!("PMEM OBJ Header:");
        println!("layout: {}", object.layout);
    }

    match &output.btt {
        Some(BttSection::Present(btt)) => {
            println!();
            println!("BTT Info (arena at {:#x}):", btt.offset);
            println!(
                "signature: {}",
                if btt.signature_valid { "BTT_ARENA_INFO" } else { "invalid" }
            );
            println!("uuid: {}", btt.uuid);
            println!("parent_uuid: {}", btt.parent_uuid);
            println!("flags: {:#x}", btt.flags);
            println!("version: {}.{}", btt.major, btt.minor);
            println!("external_lbasize: {}", btt.external_lbasize);
            println!("external_nlba: {}", btt.external_nlba);
            println!("internal_lbasize: {}", btt.internal_lbasize);
            println!("internal_nlba: {}", btt.internal_nlba);
            println!("nfree: {}", btt.nfree);
            println!("infosize: {}", btt.infosize);
            println!("nextoff: {:#x}", btt.nextoff);
            println!("dataoff: {:#x}", btt.dataoff);
            println!("mapoff: {:#x}", btt.mapoff);
            println!("flogoff: {:#x}", btt.flogoff);
            println!("infooff: {:#x}", btt.infooff);
            println!(
                "checksum: {} [{}]",
                btt.checksum,
                if btt.checksum_valid { "OK" } else { "wrong" }
            );
        }
        Some(BttSection::Absent) => {
            println!();
            println!("No BTT layout");
        }
        None => {}
    }

    if let Some(pairs) = &output.flog {
        println!();
        println!("BTT FLOG:");
        for pair in pairs {
            println!("pair {} at {:#x}:", pair.index, pair.offset);
            for (slot, entry) in pair.entries.iter().enumerate() {
                println!(
                    "  {}[{slot}] lba={:#x} old_map={:#x} new_map={:#x} seq={}",
                    if slot == pair.current { "*" } else { " " },
                    entry.lba,
                    entry.old_map,
                    entry.new_map,
                    entry.seq
                );
            }
        }
    }
}

// ── check ───────────────────────────────────────────────────────────────────

fn check_cmd(path: &Path, repair: bool, json: bool, hooks: &dyn PersistHooks) -> Result<()> {
    let command_span = info_span!(
        target: "pmp::cli::check",
        "check",
        pool = %path.display(),
        repair,
        output_json = json
    );
    let _command_guard = command_span.enter();
    let started = Instant::now();
    info!(target: "pmp::cli::check", "check_start");

    let report = check_pool(path, CheckOptions { repair }, hooks)
        .with_context(|| format!("failed to check pool {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize output")?
        );
    } else {
        print_check(&report);
    }

    info!(
        target: "pmp::cli::check",
        consistent = report.is_consistent(),
        failed = report.count(Verdict::Failed),
        repaired = report.count(Verdict::Repaired),
        duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "check_complete"
    );

    if !report.is_consistent() {
        bail!("{} is not consistent", path.display());
    }
    Ok(())
}

const fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Ok => "ok",
        Verdict::Repaired => "repaired",
        Verdict::Failed => "FAILED",
        Verdict::Skipped => "skipped",
    }
}

fn print_check(report: &CheckReport) {
    println!("pool_type: {}", report.pool_type);
    println!("size: {}", report.size);
    for item in &report.items {
        let mut line = format!(
            "{:<8} {} @ {:#x}: {}",
            verdict_label(item.verdict),
            item.structure,
            item.offset,
            item.check
        );
        if let Some(detail) = &item.detail {
            write!(&mut line, " ({detail})").expect("write to String cannot fail");
        }
        println!("{line}");
    }
    println!(
        "{}",
        if report.is_consistent() {
            "consistent"
        } else {
            "not consistent"
        }
    );
}

// ── dump ────────────────────────────────────────────────────────────────────

const DUMP_CHUNK: u64 = 64 * 1024;

fn dump_cmd(path: &Path, range: Option<&str>, json: bool) -> Result<()> {
    let command_span = info_span!(
        target: "pmp::cli::dump",
        "dump",
        pool = %path.display(),
        output_json = json
    );
    let _command_guard = command_span.enter();
    let started = Instant::now();
    info!(target: "pmp::cli::dump", "dump_start");

    let mut file = PoolFile::open(path)?;
    let size = file.size()?;
    let selection = dump_selection(size, range)?;

    let mut output = DumpOutput {
        path: path.display().to_string(),
        size,
        ranges: Vec::new(),
    };
    let mut bytes_dumped = 0_u64;
    for interval in &selection {
        let mut hex = String::new();
        for_each_dump_chunk(&mut file, *interval, |offset, chunk| {
            let dump = bytes_to_hex_dump(chunk, offset);
            if json {
                hex.push_str(&dump);
            } else {
                print!("{dump}");
            }
        })?;
        bytes_dumped = bytes_dumped.saturating_add(interval.span());
        if json {
            output.ranges.push(DumpRangeOutput {
                first: interval.first(),
                last: interval.last(),
                hex,
            });
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
    }

    info!(
        target: "pmp::cli::dump",
        ranges = selection.len(),
        bytes_dumped,
        duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "dump_complete"
    );
    Ok(())
}

/// Byte ranges to dump; empty for an empty file.
fn dump_selection(size: u64, range: Option<&str>) -> Result<RangeSet> {
    let Some(last) = size.checked_sub(1) else {
        return Ok(RangeSet::new());
    };
    let universe = Range::new(0, last);
    match range {
        Some(raw) => {
            RangeSet::parse(raw, universe).with_context(|| format!("invalid dump range {raw:?}"))
        }
        None => Ok(RangeSet::full(universe)),
    }
}

fn for_each_dump_chunk(
    file: &mut PoolFile,
    range: Range,
    mut f: impl FnMut(u64, &[u8]),
) -> Result<()> {
    let mut offset = range.first();
    loop {
        let len = (range.last() - offset).min(DUMP_CHUNK - 1) + 1;
        let buf_len = usize::try_from(len).context("dump chunk does not fit in memory")?;
        let chunk = file.read_exact_at(offset, buf_len, "dump range")?;
        f(offset, &chunk);
        match offset.checked_add(len) {
            Some(next) if next <= range.last() => offset = next,
            _ => break,
        }
    }
    Ok(())
}

fn bytes_to_hex_dump(bytes: &[u8], base: u64) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let offset = base.saturating_add((line as u64).saturating_mul(16));
        write!(&mut out, "{offset:08x}:").expect("write to String cannot fail");
        for byte in chunk {
            write!(&mut out, " {byte:02x}").expect("write to String cannot fail");
        }
        out.push('\n');
    }
    out
}

// ── plan ────────────────────────────────────────────────────────────────────

fn plan_cmd(size: u64, bsize: Option<u64>, json: bool) -> Result<()> {
    let command_span = info_span!(
        target: "pmp::cli::plan",
        "plan",
        file_size = size,
        output_json = json
    );
    let _command_guard = command_span.enter();
    info!(target: "pmp::cli::plan", "plan_start");

    let output = plan_output(size, bsize)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
    } else {
        println!("file_size: {}", output.file_size);
        println!("max_internal_lbasize: {}", output.max_internal_lbasize);
        if let Some(arena) = &output.arena {
            println!("nfree: {}", arena.nfree);
            println!("internal_nlba: {}", arena.internal_nlba);
            println!("flog_size: {}", arena.flog_size);
            println!("arena_size: {}", arena.arena_size);
        }
        if let (Some(bsize), Some(acceptable)) = (output.bsize, output.bsize_acceptable) {
            println!("bsize: {bsize}");
            println!("bsize >= max_internal_lbasize: {acceptable}");
        }
    }

    info!(
        target: "pmp::cli::plan",
        max_internal_lbasize = output.max_internal_lbasize,
        "plan_complete"
    );
    Ok(())
}

fn plan_output(size: u64, bsize: Option<u64>) -> Result<PlanOutput> {
    let max_internal_lbasize = max_internal_sector_size(size)?;
    let arena = if size == 0 {
        None
    } else {
        Some(plan_arena(size)?)
    };
    let bsize_acceptable = bsize
        .map(|candidate| is_sector_size_acceptable(candidate, size))
        .transpose()?;
    Ok(PlanOutput {
        file_size: size,
        max_internal_lbasize,
        arena,
        bsize,
        bsize_acceptable,
    })
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn format_uuid(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(36);
    for (idx, byte) in bytes.iter().enumerate() {
        if matches!(idx, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        write!(&mut out, "{byte:02x}").expect("write to String cannot fail");
    }
    out
}
