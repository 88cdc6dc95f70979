use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use rustc_hash::FxHashMap;
use chrono::{DateTime, Local};
use log::debug;

use crate::lib::common::{AnnotError, FolderRole, Folders, VersionInfo, expand_home, file_stem, resolve_program};
use crate::lib::hts_lib_based::extract_manual_table;
use crate::lib::meta::Identifiers;


/// How VEP is called, both inside vcf2maf and for
/// the optional custom annotation run.
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct VepConfig {
    /// the vep executable, its folder is handed to vcf2maf.
    /// A bare name is looked up in `PATH`.
    pub path: PathBuf,
    /// the .vep cache folder
    pub data: PathBuf,
    /// number of forks
    pub n_fork: u32,
    /// reference genome
    pub fasta: PathBuf,
    /// e.g. GRCh37, used as well as NCBI build for vcf2maf
    pub assembly: String,
    pub species: String,
    /// if unset the tools pick the newest one
    pub cache_version: Option<String>,
    /// if an additional VEP run with `--custom` is done
    pub custom_run: bool,
    /// the value of `--custom`, e.g.
    /// `~/.vep/custom/ClinVar/clinvar.vcf.gz,ClinVar,vcf,exact,0,CLNSIG,CLNREVSTAT,CLNDN`
    pub custom_opt: Option<String>,
    /// redo the custom run even if its output exists
    pub custom_overwrite: bool,
}

impl Default for VepConfig {
    fn default() -> Self {
        VepConfig {
            path: resolve_program(Path::new("vep")),
            data: expand_home("~/.vep"),
            n_fork: 4,
            fasta: expand_home("~/.vep/homo_sapiens/101_GRCh37/Homo_sapiens.GRCh37.75.dna.primary_assembly.fa"),
            assembly: String::from("GRCh37"),
            species: String::from("homo_sapiens"),
            cache_version: None,
            custom_run: false,
            custom_opt: None,
            custom_overwrite: true,
        }
    }
}

/// How vcf2maf is called.
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct Vcf2mafConfig {
    /// vcf2maf.pl, needs to be executable
    pub path: PathBuf,
    /// if false no MAF is produced by vcf2maf
    pub run: bool,
    /// redo the conversion even if the MAF exists
    pub overwrite: bool,
    /// VCF of common variants to flag, `None` keeps the vcf2maf default
    pub filter_vcf: Option<PathBuf>,
}

impl Default for Vcf2mafConfig {
    fn default() -> Self {
        Vcf2mafConfig {
            path: PathBuf::from("vcf2maf.pl"),
            run: true,
            overwrite: true,
            filter_vcf: None,
        }
    }
}

/// Everything produced for one VCF. Optional entries are
/// absent if the corresponding step was disabled.
#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct AnnotationOutcome {
    /// FORMAT values of the normal and tumor column
    pub manual: PathBuf,
    /// raw vcf2maf result
    pub vcf2maf: Option<PathBuf>,
    /// custom VEP result
    pub vep: Option<PathBuf>,
    /// final MAF
    pub maf: Option<PathBuf>,
}

/// tools are started without a shell, so `~` is expanded here
fn path_arg(path: &Path) -> String {
    expand_home(&path.to_string_lossy()).display().to_string()
}

/// builds the vcf2maf arguments. The tumor and normal ids written into
/// the MAF are the barcodes, while the VCF ids are the column names.
///
/// Unittest: TRUE
///
pub fn vcf2maf_args(
    vcf        : &Path,
    out_maf    : &Path,
    tmp_dir    : &Path,
    col_normal : &str,
    col_tumor  : &str,
    identifiers: &Identifiers,
    vep_config : &VepConfig,
    config     : &Vcf2mafConfig
) -> Vec<String> {
    let mut args : Vec<String> = vec![
        String::from("--input-vcf"),    path_arg(vcf),
        String::from("--output-maf"),   path_arg(out_maf),
        String::from("--tmp-dir"),      path_arg(tmp_dir),
        String::from("--tumor-id"),     identifiers.tumor_sample_barcode.clone(),
        String::from("--normal-id"),    identifiers.matched_norm_sample_barcode.clone(),
        String::from("--vcf-tumor-id"), col_tumor.to_string(),
        String::from("--vcf-normal-id"),col_normal.to_string(),
    ];
    // vcf2maf wants the folder containing vep and does not search PATH
    let vep = resolve_program(&vep_config.path);
    match vep.parent().filter(|x| !x.as_os_str().is_empty()) {
        Some(vep_dir) => {
            args.push(String::from("--vep-path"));
            args.push(path_arg(vep_dir));
        },
        None => eprintln!("WARNING: {:?} not found in PATH, vcf2maf uses its default vep folder", vep_config.path),
    }
    args.extend(vec![
        String::from("--vep-data"),   path_arg(&vep_config.data),
        String::from("--vep-forks"),  vep_config.n_fork.to_string(),
        String::from("--ref-fasta"),  path_arg(&vep_config.fasta),
        String::from("--ncbi-build"), vep_config.assembly.clone(),
        String::from("--species"),    vep_config.species.clone(),
    ]);
    if let Some(x) = &vep_config.cache_version {
        args.push(String::from("--cache-version"));
        args.push(x.clone());
    }
    if let Some(x) = &config.filter_vcf {
        args.push(String::from("--filter-vcf"));
        args.push(path_arg(x));
    }
    args
}

/// builds the arguments of the custom VEP run, output
/// is a VCF with the custom annotation in the CSQ field
///
/// Unittest: TRUE
///
pub fn vep_custom_args(
    vcf       : &Path,
    out       : &Path,
    vep_config: &VepConfig
) -> Vec<String> {
    let mut args : Vec<String> = vec![
        String::from("--input_file"),  path_arg(vcf),
        String::from("--output_file"), path_arg(out),
        String::from("--format"),      String::from("vcf"),
        String::from("--vcf"),
        String::from("--offline"),
        String::from("--cache"),
        String::from("--dir_cache"),   path_arg(&vep_config.data),
        String::from("--assembly"),    vep_config.assembly.clone(),
        String::from("--species"),     vep_config.species.clone(),
        String::from("--fasta"),       path_arg(&vep_config.fasta),
        String::from("--fork"),        vep_config.n_fork.to_string(),
        String::from("--force_overwrite"),
    ];
    if let Some(x) = &vep_config.cache_version {
        args.push(String::from("--cache_version"));
        args.push(x.clone());
    }
    if let Some(x) = &vep_config.custom_opt {
        args.push(String::from("--custom"));
        args.push(expand_home(x).display().to_string());
    }
    args
}

/// a step is (re-)run if its output is missing or if
/// we are asked to overwrite
pub fn needs_run(
    out      : &Path,
    overwrite: bool
) -> bool {
    overwrite || !out.exists()
}

/// runs an external tool and keeps its stdout+stderr in `log`
fn run_tool(
    tool   : &str,
    program: &Path,
    args   : &[String],
    log    : &Path,
    vcf    : &str
) -> Result<(), AnnotError> {
    debug!("running {} {}", program.display(), args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| AnnotError::ToolStart {
            tool: tool.to_string(),
            program: program.to_path_buf(),
            vcf: vcf.to_string(),
            source,
        })?;
    let mut log_file = File::create(log)?;
    log_file.write_all(&output.stdout)?;
    log_file.write_all(&output.stderr)?;
    if !output.status.success() {
        return Err(AnnotError::ToolFailed {
            tool: tool.to_string(),
            vcf: vcf.to_string(),
            status: output.status.to_string(),
            log: log.to_path_buf(),
        });
    }
    Ok(())
}

fn strip_chr(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

/// one line of the manual table
#[derive(Debug,Clone,PartialEq,Eq)]
struct ManualEntry {
    ref_allele : String,
    alt_alleles: Vec<String>,
    values     : Vec<String>,
}

type ManualLookup = FxHashMap<(String,String), Vec<ManualEntry>>;

/// VCF alleles as vcf2maf writes them into the MAF: indels lose
/// their shared first base and an empty allele becomes "-"
fn maf_alleles(
    ref_allele: &str,
    alt_allele: &str
) -> (String, String) {
    let (mut r, mut a) = (ref_allele, alt_allele);
    let same_first = matches!((r.get(..1), a.get(..1)), (Some(x), Some(y)) if x == y);
    if r.len() != a.len() && same_first {
        r = &r[1..];
        a = &a[1..];
    }
    let dash = |x: &str| if x.is_empty() { String::from("-") } else { x.to_string() };
    (dash(r), dash(a))
}

impl ManualEntry {
    fn matches(
        &self,
        maf_ref: &str,
        maf_alt: &str
    ) -> bool {
        self.alt_alleles.iter().any(|alt| {
            (self.ref_allele == maf_ref && alt == maf_alt)
                || maf_alleles(&self.ref_allele, alt) == (maf_ref.to_string(), maf_alt.to_string())
        })
    }
}

/// picks the manual values of one MAF row. A single record at the position
/// is taken directly, several ones are told apart by the alleles
/// and nothing is returned if the alleles do not decide.
fn manual_values<'a>(
    entries: &'a [ManualEntry],
    alleles: Option<(&str, &str)>
) -> Option<&'a Vec<String>> {
    match entries {
        [single] => Some(&single.values),
        _ => {
            let (maf_ref, maf_alt) = alleles?;
            let mut found = entries.iter().filter(|e| e.matches(maf_ref, maf_alt));
            match (found.next(), found.next()) {
                (Some(x), None) => Some(&x.values),
                _ => None,
            }
        },
    }
}

/// reads the manual table into a lookup by (chromosome, position)
/// and returns as well the value column names
fn read_manual_table(
    manual: &Path
) -> Result<(Vec<String>, ManualLookup), AnnotError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .has_headers(true)
        .from_path(manual)?;
    let columns : Vec<String> = reader.headers()?.iter().skip(4).map(String::from).collect();
    let mut lookup : ManualLookup = FxHashMap::default();
    for result in reader.records() {
        let record = result?;
        let chrom = record.get(0).unwrap_or(".");
        let pos   = record.get(1).unwrap_or(".");
        let entry = ManualEntry {
            ref_allele : record.get(2).unwrap_or(".").to_string(),
            alt_alleles: record.get(3).unwrap_or(".").split(',').map(String::from).collect(),
            values     : record.iter().skip(4).map(String::from).collect(),
        };
        lookup.entry((strip_chr(chrom).to_string(), pos.to_string()))
            .or_default()
            .push(entry);
    }
    Ok((columns, lookup))
}

/// returns the index of `name` in the header and appends it if missing
fn column_index(
    header: &mut Vec<String>,
    name  : &str
) -> usize {
    match header.iter().position(|h| h == name) {
        Some(x) => x,
        None => {
            header.push(name.to_string());
            header.len() - 1
        },
    }
}

/// this function takes the MAF produced by vcf2maf and writes the final MAF.
/// The identifier columns are set (or added) and the normal and tumor values of
/// the manual table are appended. Rows are matched on chromosome (without `chr`)
/// and the original VCF position (`vcf_pos`). If several VCF records share the
/// position, `Reference_Allele` and `Tumor_Seq_Allele2` pick the record.
/// Rows without match get ".".
/// Returns the number of written rows.
///
/// Unittest: TRUE
///
pub fn assemble_maf(
    vcf2maf_maf: &Path,
    manual     : Option<&Path>,
    identifiers: &Identifiers,
    version    : &VersionInfo,
    out        : &Path
) -> Result<usize, AnnotError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(false)
        .from_path(vcf2maf_maf)?;
    let mut records = reader.records();

    // the leading comment lines (e.g. `#version 2.4`) are kept
    let mut comments : Vec<String> = Vec::new();
    let mut header : Vec<String> = loop {
        match records.next() {
            Some(result) => {
                let record = result?;
                let first = record.get(0).unwrap_or("");
                if first.starts_with('#') {
                    comments.push(record.iter().collect::<Vec<&str>>().join("\t"));
                }else{
                    break record.iter().map(String::from).collect();
                }
            },
            None => return Err(AnnotError::EmptyMaf(vcf2maf_maf.to_path_buf())),
        }
    };
    let n_original = header.len();
    let chrom_idx = header.iter().position(|h| h == "Chromosome");
    let pos_idx   = header.iter().position(|h| h == "vcf_pos");
    let ref_idx   = header.iter().position(|h| h == "Reference_Allele");
    let alt_idx   = header.iter().position(|h| h == "Tumor_Seq_Allele2");

    let fields = identifiers.fields();
    let mut ident_idx : Vec<(usize, &str)> = Vec::new();
    for (name, value) in fields.iter() {
        ident_idx.push((column_index(&mut header, name), *value));
    }

    let (manual_columns, manual_lookup) = match manual {
        Some(x) => read_manual_table(x)?,
        None => (Vec::new(), FxHashMap::default()),
    };
    let manual_start = header.len();
    header.extend(manual_columns.iter().cloned());
    if !manual_columns.is_empty() && (chrom_idx.is_none() || pos_idx.is_none()) {
        eprintln!("WARNING: {:?} lacks Chromosome or vcf_pos, manual values will be empty", vcf2maf_maf);
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .flexible(true)
        .from_path(out)?;
    let now: DateTime<Local> = Local::now();
    for comment in comments.iter() {
        writer.write_record([comment])?;
    }
    writer.write_record([format!("#{}:{}", version.program, version.version)])?;
    writer.write_record([format!("#author:{}", version.author)])?;
    writer.write_record([format!("#date:{}", now.to_rfc2822())])?;
    writer.write_record([format!("#command:{}", version.command)])?;
    writer.write_record(&header)?;

    let mut n_rows = 0_usize;
    for result in records {
        let record = result?;
        let mut row : Vec<String> = record.iter().map(String::from).collect();
        row.resize(n_original, String::new());
        row.resize(header.len(), String::from("."));
        for (idx, value) in ident_idx.iter() {
            row[*idx] = value.to_string();
        }
        if let (Some(c), Some(p)) = (chrom_idx, pos_idx) {
            let key = (strip_chr(&row[c]).to_string(), row[p].clone());
            let alleles = match (ref_idx, alt_idx) {
                (Some(r), Some(a)) => Some((row[r].as_str(), row[a].as_str())),
                _ => None,
            };
            let values = manual_lookup.get(&key)
                .and_then(|entries| manual_values(entries, alleles))
                .cloned();
            match values {
                Some(values) => {
                    for (i, value) in values.into_iter().enumerate().take(manual_columns.len()) {
                        row[manual_start + i] = value;
                    }
                },
                None if manual_lookup.contains_key(&key) => {
                    debug!("{:?}: alleles do not decide between the records at {:?}", vcf2maf_maf, key);
                },
                None => (),
            }
        }
        writer.write_record(&row)?;
        n_rows += 1;
    }
    writer.flush()?;
    debug!("wrote {} rows into {:?}", n_rows, out);
    Ok(n_rows)
}

/// Annotates one VCF file of `vcf_folder`:
///  1. FORMAT values of the normal and tumor column are extracted into the manual table
///  2. vcf2maf is run, if enabled and needed
///  3. VEP is run with the custom annotation, if enabled and needed
///  4. the final MAF is assembled from the vcf2maf output and the manual table
///
/// The column names `col_normal` and `col_tumor` are the sample names inside
/// the VCF, the identifiers are the ones written into the MAF.
///
/// Unittest: TRUE
///
#[allow(clippy::too_many_arguments)]
pub fn run_annotator(
    vcf_folder    : &Path,
    vcf_file      : &str,
    col_normal    : &str,
    col_tumor     : &str,
    infos_n_reads : &[&str],
    infos_other   : &[&str],
    folders       : &Folders,
    identifiers   : &Identifiers,
    vep_config    : &VepConfig,
    vcf2maf_config: &Vcf2mafConfig,
    version       : &VersionInfo
) -> Result<AnnotationOutcome, AnnotError> {
    let vcf  = vcf_folder.join(vcf_file);
    let stem = file_stem(vcf_file);

    // 1. manual extraction, cheap and always redone
    let manual = folders.get(FolderRole::ManualOut).join(format!("{}.txt", stem));
    let n_records = extract_manual_table(&vcf, &manual, col_normal, col_tumor, infos_n_reads, infos_other)?;
    eprintln!("INFO: extracted {} records of {} into {:?}", n_records, vcf_file, manual);
    let mut outcome = AnnotationOutcome {
        manual,
        ..Default::default()
    };

    // 2. vcf2maf
    let vcf2maf_out = folders.get(FolderRole::Vcf2mafOut).join(format!("{}.maf", stem));
    if vcf2maf_config.run {
        if needs_run(&vcf2maf_out, vcf2maf_config.overwrite) {
            let tmp_dir = folders.get(FolderRole::Vcf2mafTmp);
            let args = vcf2maf_args(&vcf, &vcf2maf_out, tmp_dir, col_normal, col_tumor, identifiers, vep_config, vcf2maf_config);
            let log = tmp_dir.join(format!("{}.vcf2maf.log", stem));
            eprintln!("INFO: running vcf2maf on {}", vcf_file);
            run_tool("vcf2maf", &vcf2maf_config.path, &args, &log, vcf_file)?;
        }else{
            eprintln!("INFO: {:?} exists, skipping vcf2maf", vcf2maf_out);
        }
    }
    if vcf2maf_out.exists() {
        outcome.vcf2maf = Some(vcf2maf_out);
    }

    // 3. custom VEP
    if vep_config.custom_run {
        let vep_out = folders.get(FolderRole::VepOut).join(format!("{}.vcf", stem));
        if needs_run(&vep_out, vep_config.custom_overwrite) {
            let args = vep_custom_args(&vcf, &vep_out, vep_config);
            let log = folders.get(FolderRole::VepOut).join(format!("{}.vep.log", stem));
            eprintln!("INFO: running custom VEP on {}", vcf_file);
            run_tool("vep", &vep_config.path, &args, &log, vcf_file)?;
        }else{
            eprintln!("INFO: {:?} exists, skipping custom VEP", vep_out);
        }
        outcome.vep = Some(vep_out);
    }

    // 4. final MAF
    match &outcome.vcf2maf {
        Some(vcf2maf_maf) => {
            let maf = folders.get(FolderRole::Maf).join(format!("{}.maf", stem));
            let n_rows = assemble_maf(vcf2maf_maf, Some(&outcome.manual), identifiers, version, &maf)?;
            eprintln!("INFO: wrote {} MAF rows into {:?}", n_rows, maf);
            outcome.maf = Some(maf);
        },
        None => {
            eprintln!("WARNING: no vcf2maf result for {}, no final MAF written", vcf_file);
        },
    }
    Ok(outcome)
}
