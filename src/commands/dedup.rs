//! Duplicate marking command.
//!
//! Marks or removes PCR/optical duplicates in a coordinate-sorted BAM file.
//!
//! # Algorithm
//!
//! Pass 1 streams the input through the dedup engine: records are
//! fingerprinted by library, reference, strand, and unclipped 5' anchor;
//! colliding candidates are resolved by pairing evidence, then summed base
//! quality, then input order. The engine emits the input ordinals of the
//! losers. Pass 2 re-reads the input and writes every record in its
//! original order with the duplicate flag (0x400) set on the losers.
//!
//! # Output Modes
//!
//! - Mark only (default): set the duplicate flag on losing reads
//! - Remove (`--rmDups`): drop losing reads from the output entirely

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;

use dupmark_lib::bam_io::{check_bgzf_eof, create_bam_reader, create_bam_writer};
use dupmark_lib::engine::{DedupConfig, DedupEngine, PassOneSummary};
use dupmark_lib::header::add_pg_record;
use dupmark_lib::library::LibraryMap;
use dupmark_lib::logging::{OperationTimer, SummaryLog, format_count};
use dupmark_lib::phred::DEFAULT_MIN_QUAL;
use dupmark_lib::sam::{declared_sort_order, is_coordinate_sorted};
use dupmark_lib::validation::{validate_file_exists, validate_quality_score};

use crate::commands::command::Command;

/// How often the passes report progress under `--verbose`.
const PROGRESS_INTERVAL: u32 = 100_000;

/// Duplicate marking command.
#[derive(Debug, Parser)]
#[command(
    name = "dedup",
    about = "Mark or remove PCR duplicates in a coordinate-sorted BAM",
    long_about = r#"
Marks or removes PCR/optical duplicates in a coordinate-sorted BAM file,
writing records in their original order.

Reads sharing a library, reference, strand and unclipped 5' anchor are
duplicates of one another. Within a duplicate group the survivor is the
read (or read pair) with the highest summed base quality; paired evidence
outranks single-end quality, and ties fall to the earliest record in the
input. Input that already carries duplicate flags is rejected unless
--force is given, in which case stale flags are cleared and marking starts
over.
"#
)]
pub struct Dedup {
    /// Input BAM file (must be coordinate sorted)
    #[arg(long = "in")]
    pub input: PathBuf,

    /// Output BAM file (records keep their input order)
    #[arg(long = "out")]
    pub output: PathBuf,

    /// Only count base qualities at or above this Phred score
    #[arg(long = "minQual", default_value_t = DEFAULT_MIN_QUAL)]
    pub min_qual: u8,

    /// Log file for summary statistics (default: <out>.log, or stderr when
    /// <out> begins with '-')
    #[arg(long = "log")]
    pub log: Option<PathBuf>,

    /// Treat reads with mates on different chromosomes as single-ended
    #[arg(long = "oneChrom")]
    pub one_chrom: bool,

    /// Remove duplicates instead of marking them
    #[arg(long = "rmDups")]
    pub rm_dups: bool,

    /// Accept an already mark-duplicated input and clear stale flags
    #[arg(long = "force")]
    pub force: bool,

    /// Log progress every 100,000 records
    #[arg(long = "verbose")]
    pub verbose: bool,

    /// Do not require the trailing BGZF EOF block on the input
    #[arg(long = "noeof")]
    pub noeof: bool,

    /// Print the parameter settings at startup
    #[arg(long = "params")]
    pub params: bool,

    /// Recalibrate base qualities while writing (requires the external
    /// recalibration component)
    #[arg(long = "recab")]
    pub recab: bool,
}

impl Command for Dedup {
    fn execute(&self, command_line: &str) -> Result<()> {
        validate_file_exists(&self.input, "input BAM")?;
        validate_quality_score(self.min_qual, "minQual")?;
        if self.recab {
            bail!(
                "--recab delegates to the standalone base-quality recalibration \
                 component, which is not bundled in this build"
            );
        }

        if self.params {
            self.log_params();
        }

        let mut summary_log = SummaryLog::for_output(self.log.as_deref(), &self.output)
            .context("Failed to open the summary log")?;

        if !self.noeof {
            check_bgzf_eof(&self.input)?;
        }

        let timer = OperationTimer::new("Marking duplicates");

        let mut summary = self.run_pass_one()?;
        write_pass_one_summary(&mut summary_log, &summary)?;

        info!(
            "Sorted the ordinals of {} duplicate records",
            format_count(summary.duplicates.len() as u64)
        );

        let written = self.run_pass_two(&mut summary, command_line, &mut summary_log)?;
        summary_log.flush().context("Failed to flush the summary log")?;

        timer.log_completion(written);
        Ok(())
    }
}

impl Dedup {
    fn log_params(&self) {
        info!("dedup parameters:");
        info!("  in       : {}", self.input.display());
        info!("  out      : {}", self.output.display());
        info!("  minQual  : {}", self.min_qual);
        info!("  log      : {}", self.log.as_ref().map_or_else(String::new, |p| p.display().to_string()));
        info!("  oneChrom : {}", self.one_chrom);
        info!("  rmDups   : {}", self.rm_dups);
        info!("  force    : {}", self.force);
        info!("  verbose  : {}", self.verbose);
        info!("  noeof    : {}", self.noeof);
        info!("  recab    : {}", self.recab);
    }

    /// Streams the input through the engine and returns the duplicate list.
    fn run_pass_one(&self) -> Result<PassOneSummary> {
        let (mut reader, header) = create_bam_reader(&self.input)?;

        // a header without an SO field falls through to streaming validation
        if let Some(order) = declared_sort_order(&header) {
            if !is_coordinate_sorted(&header) {
                bail!(
                    "input BAM declares SO:{} but dedup requires coordinate-sorted input.\n\
                     To sort it, run:\n  samtools sort {} -o sorted.bam",
                    String::from_utf8_lossy(order),
                    self.input.display()
                );
            }
        }

        let libraries = LibraryMap::from_header(&header)?;
        info!("{} libraries declared in the header", libraries.library_count());
        let config = DedupConfig {
            min_qual: self.min_qual,
            one_chrom: self.one_chrom,
            force: self.force,
        };
        let mut engine = DedupEngine::new(config, libraries, None);

        let mut ordinal: u32 = 0;
        loop {
            let mut record = engine.acquire_record();
            if reader.read_record_buf(&header, &mut record)? == 0 {
                engine.recycle(record);
                break;
            }
            engine.process(record, ordinal)?;
            ordinal += 1;

            if self.verbose && ordinal % PROGRESS_INTERVAL == 0 {
                info!(
                    "records={} fragments={} pairs={} pending_mates={}",
                    ordinal,
                    engine.fragment_count(),
                    engine.pair_count(),
                    engine.pending_mate_count()
                );
            }
        }

        Ok(engine.finish())
    }

    /// Re-reads the input and writes records with duplicate flags applied.
    fn run_pass_two(
        &self,
        summary: &mut PassOneSummary,
        command_line: &str,
        summary_log: &mut SummaryLog,
    ) -> Result<u64> {
        let (mut reader, header) = create_bam_reader(&self.input)?;
        let out_header = add_pg_record(header.clone(), crate::version::VERSION.as_str(), command_line)?;
        let mut writer = create_bam_writer(&self.output, &out_header)?;

        // the recalibration model, fed by pass 1, is emitted before any record
        let mut recalibrator = summary.recalibrator.take();
        if let Some(recalibrator) = recalibrator.as_mut() {
            recalibrator.write_model(&self.output)?;
        }

        info!("Writing {}", self.output.display());

        let mut cursor = summary.duplicates.cursor();
        let mut record = RecordBuf::default();
        let mut ordinal: u32 = 0;
        let mut single_duplicates: u64 = 0;
        let mut paired_duplicates: u64 = 0;

        while reader.read_record_buf(&header, &mut record)? != 0 {
            let flags = u16::from(record.flags());

            if cursor.matches(ordinal) {
                *record.flags_mut() = Flags::from(flags | u16::from(Flags::DUPLICATE));
                // a duplicate is unpaired when its record is not paired or
                // its mate is unmapped
                if flags & u16::from(Flags::SEGMENTED) == 0
                    || flags & u16::from(Flags::MATE_UNMAPPED) != 0
                {
                    single_duplicates += 1;
                } else {
                    paired_duplicates += 1;
                }
                if !self.rm_dups {
                    if let Some(recalibrator) = recalibrator.as_mut() {
                        recalibrator.apply(&mut record);
                    }
                    writer.write_alignment_record(&out_header, &record)?;
                }
            } else {
                if self.force {
                    *record.flags_mut() = Flags::from(flags & !u16::from(Flags::DUPLICATE));
                }
                if let Some(recalibrator) = recalibrator.as_mut() {
                    recalibrator.apply(&mut record);
                }
                writer.write_alignment_record(&out_header, &record)?;
            }

            ordinal += 1;
            if self.verbose && ordinal % PROGRESS_INTERVAL == 0 {
                info!("records={ordinal}");
            }
        }

        writer.finish(&out_header)?;

        let verb = if self.rm_dups { "Removed" } else { "Marked" };
        let line = format!(
            "{verb} {single_duplicates} unpaired and {} paired duplicate reads",
            paired_duplicates / 2
        );
        summary_log.line(&line)?;
        info!("{line}");

        Ok(u64::from(ordinal))
    }
}

/// Writes the pass-1 statistics block to the summary log.
fn write_pass_one_summary(log: &mut SummaryLog, summary: &PassOneSummary) -> Result<()> {
    let stats = &summary.stats;
    log.rule()?;
    log.line("SUMMARY STATISTICS OF THE READS")?;
    log.line(&format!("Total number of reads: {}", stats.records))?;
    log.line(&format!("Total number of paired-end reads: {}", stats.paired))?;
    log.line(&format!("Total number of properly paired reads: {}", stats.proper_pair))?;
    log.line(&format!("Total number of unmapped reads: {}", stats.unmapped))?;
    log.line(&format!("Total number of reverse strand mapped reads: {}", stats.reverse))?;
    log.line(&format!("Total number of QC-failed reads: {}", stats.qc_fail))?;
    log.line(&format!("Size of fragment table (must be zero): {}", summary.final_fragments))?;
    log.line(&format!("Size of paired table (must be zero): {}", summary.final_pairs))?;
    log.line(&format!(
        "Size of pending-mate table (must be zero): {}",
        summary.final_pending_mates
    ))?;
    log.line(&format!("Total number of missing mates: {}", stats.missing_mate))?;
    log.rule()?;
    Ok(())
}
