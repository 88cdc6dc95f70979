//!
//! ## varannot ##
//! --------------
//! Annotates the VCF files of one cohort with vcf2maf and VEP.
//! A tab-separated metadata table links every VCF file to its tumor sample
//! and the barcodes of the tumor and normal sample. The tumor sample column
//! in the VCF is expected to be named PRIMARY for primary tumors (site 01) and
//! METASTATIC otherwise, the normal one NORMAL.
//!
//! To process large cohorts in parallel the list of VCF files can be
//! split with `--n_split` and each invocation works on the split `--i_split`.
//!
//! Example:
//! ```text
//! varannot \
//!     --i_split 1 \
//!     --n_split 1 \
//!     --vep_data ~/.vep \
//!     --vep_n_fork 4 \
//!     --fasta ~/.vep/homo_sapiens/101_GRCh37/Homo_sapiens.GRCh37.75.dna.primary_assembly.fa
//! ```
use clap::{app_from_crate,crate_name,crate_description,crate_authors,crate_version,value_t,Arg};
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use log::debug;
extern crate pretty_env_logger;

// our library which is within the same project
extern crate varannot;
use varannot::lib::common::{*};
use varannot::lib::meta::{MetaColumns, MetaTable, COL_NORMAL};
use varannot::lib::annotator::{run_annotator, VepConfig, Vcf2mafConfig};

/// FORMAT fields with read counts
const INFOS_N_READS: [&str; 3] = ["AD", "DP", "FA"];
/// other FORMAT fields of interest
const INFOS_OTHER: [&str; 2] = ["SS", "GT"];

/// everything the driver needs besides the tool configurations
#[derive(Debug)]
struct DriverConfig {
    i_split   : usize,
    n_split   : usize,
    vcf_folder: PathBuf,
    out_folder: PathBuf,
    meta      : PathBuf,
    pattern   : String,
    columns   : MetaColumns,
}

/// the metadata table sits by default next to the VCF files
fn default_meta(
    vcf_folder: &Path
) -> PathBuf {
    vcf_folder.join("vcf_meta.txt")
}

/// Runs the annotation of all files in our split.
/// Returns the names of the files which failed, setup errors
/// are returned directly.
fn run(
    config        : &DriverConfig,
    vep_config    : &VepConfig,
    vcf2maf_config: &Vcf2mafConfig,
    version       : &VersionInfo
) -> Result<Vec<String>, AnnotError> {

    ////////////////////////
    ////    1. LOAD     ////
    ////////////////////////
    let folders = Folders::new(&config.out_folder);
    folders.create_all()?;
    for (role, path) in folders.iter() {
        debug!("{}: {:?}", role.as_str(), path);
    }

    let meta = MetaTable::from_path(&config.meta, config.columns.clone())?;
    eprintln!("INFO: metadata table contained {} entries", meta.len());
    let vcf_files = list_vcf_files(&config.vcf_folder, &config.pattern)?;
    eprintln!("INFO: found {} VCF files in {:?}", vcf_files.len(), config.vcf_folder);

    ////////////////////////
    ////    2. SPLIT    ////
    ////////////////////////
    let vcf_files = split_files(&vcf_files, config.i_split, config.n_split)?;
    let count_total = vcf_files.len();
    eprintln!("INFO: split {}/{} contains {} VCF files", config.i_split, config.n_split, count_total);

    ////////////////////////
    ////  3. ANNOTATE   ////
    ////////////////////////
    let mut failed : Vec<String> = Vec::new();
    for (count, vcf_file) in vcf_files.iter().enumerate() {
        eprintln!("{}", "=".repeat(80));
        eprintln!("vcf {}/{}", count + 1, count_total);
        eprintln!("processing {}\n", vcf_file);

        let identifiers = match meta.identifiers(vcf_file) {
            Ok(x) => x,
            Err(err) => {
                eprintln!("WARNING: skipping {}: {}", vcf_file, err);
                failed.push(vcf_file.clone());
                continue;
            },
        };
        let col_tumor = identifiers.tumor_type();
        debug!("{}: {:?} tumor column {}", vcf_file, identifiers, col_tumor);

        match run_annotator(
            &config.vcf_folder,
            vcf_file,
            COL_NORMAL,
            col_tumor.as_str(),
            &INFOS_N_READS,
            &INFOS_OTHER,
            &folders,
            &identifiers,
            vep_config,
            vcf2maf_config,
            version,
        ) {
            Ok(outcome) => debug!("{}: {:?}", vcf_file, outcome),
            Err(err) => {
                eprintln!("WARNING: annotation of {} failed: {}", vcf_file, err);
                failed.push(vcf_file.clone());
            },
        }
    }
    eprintln!("INFO: annotated {} of {} VCF files", count_total - failed.len(), count_total);
    Ok(failed)
}

fn main() {
    pretty_env_logger::init();

    // now the next is not really for any argument
    // parsing but simply to get the command which
    // was used to execute as I cant get this from clap
    let args: Vec<String> = env::args().collect();
    let args_string = args.join(" ");
    let matches = app_from_crate!()
        .about("This tool annotates the VCF files of a cohort with vcf2maf and VEP. \
        The files are linked to their tumor/normal pair via a tab-separated metadata table. \
        The list of files can be split for parallel processing.")
        .arg(Arg::with_name("I_SPLIT")
            .long("i_split")
            .value_name("int")
            .help("the split processed, 1-based")
            .takes_value(true)
            .default_value("1"))
        .arg(Arg::with_name("N_SPLIT")
            .long("n_split")
            .value_name("int")
            .help("total number of splits")
            .takes_value(true)
            .default_value("1"))
        .arg(Arg::with_name("VEP_DATA")
            .long("vep_data")
            .value_name("DIR")
            .help("path to the .vep data folder")
            .takes_value(true)
            .default_value("~/.vep"))
        .arg(Arg::with_name("VEP_N_FORK")
            .long("vep_n_fork")
            .value_name("int")
            .help("number of forks to be used by VEP")
            .takes_value(true)
            .default_value("4"))
        .arg(Arg::with_name("FASTA")
            .long("fasta")
            .value_name("FILE")
            .help("path to reference genome FASTA file")
            .takes_value(true)
            .default_value("~/.vep/homo_sapiens/101_GRCh37/Homo_sapiens.GRCh37.75.dna.primary_assembly.fa"))
        .arg(Arg::with_name("VCF_FOLDER")
            .long("vcf_folder")
            .value_name("DIR")
            .help("folder with the VCF files")
            .takes_value(true)
            .default_value("./data/TCGA_GA/"))
        .arg(Arg::with_name("OUT_FOLDER")
            .long("out_folder")
            .value_name("DIR")
            .help("results folder, the sub-folders are created if needed")
            .takes_value(true)
            .default_value("./results/TCGA_GA/"))
        .arg(Arg::with_name("META")
            .long("meta")
            .value_name("FILE")
            .help("tab-separated metadata table [default: <vcf_folder>/vcf_meta.txt]")
            .takes_value(true)
            .required(false))
        .arg(Arg::with_name("META_FILE_COL")
            .long("meta_file_col")
            .value_name("STRING")
            .help("column of the metadata table with the VCF file names")
            .takes_value(true)
            .default_value("file_name_GA"))
        .arg(Arg::with_name("PATTERN")
            .long("pattern")
            .value_name("REGEX")
            .help("only files of the VCF folder matching this are annotated")
            .takes_value(true)
            .default_value(r"\.vcf$"))
        .arg(Arg::with_name("VEP_PATH")
            .long("vep_path")
            .value_name("FILE")
            .help("the vep executable, a bare name is looked up in PATH")
            .takes_value(true)
            .default_value("vep"))
        .arg(Arg::with_name("ASSEMBLY")
            .long("assembly")
            .value_name("STRING")
            .help("genome assembly of the VEP cache and the FASTA")
            .takes_value(true)
            .default_value("GRCh37"))
        .arg(Arg::with_name("CACHE_VERSION")
            .long("cache_version")
            .value_name("STRING")
            .help("version of the VEP cache, by default the newest one")
            .takes_value(true)
            .required(false))
        .arg(Arg::with_name("CUSTOM_OPT")
            .long("custom_opt")
            .value_name("STRING")
            .help("if set, VEP is run additionally with this --custom annotation, \
            e.g. ~/.vep/custom/ClinVar/clinvar.vcf.gz,ClinVar,vcf,exact,0,CLNSIG,CLNREVSTAT,CLNDN")
            .takes_value(true)
            .required(false))
        .arg(Arg::with_name("VCF2MAF_PATH")
            .long("vcf2maf_path")
            .value_name("FILE")
            .help("the vcf2maf.pl script")
            .takes_value(true)
            .default_value("vcf2maf.pl"))
        .arg(Arg::with_name("NO_VCF2MAF")
            .long("no_vcf2maf")
            .help("do not run vcf2maf, only the tables from the VCF are written")
            .takes_value(false))
        .arg(Arg::with_name("KEEP")
            .long("keep")
            .help("keep existing vcf2maf and VEP results instead of overwriting them")
            .takes_value(false))
        .get_matches();

    let i_split    = value_t!(matches, "I_SPLIT", usize).unwrap_or_else(|e| e.exit());
    let n_split    = value_t!(matches, "N_SPLIT", usize).unwrap_or_else(|e| e.exit());
    let vep_n_fork = value_t!(matches, "VEP_N_FORK", u32).unwrap_or_else(|e| e.exit());
    // the ones with defaults are always present
    let value = |name: &str| matches.value_of(name).unwrap_or_default().to_string();
    let keep = matches.is_present("KEEP");

    let vcf_folder = expand_home(&value("VCF_FOLDER"));
    let meta = match matches.value_of("META") {
        Some(x) => expand_home(x),
        None    => default_meta(&vcf_folder),
    };
    let config = DriverConfig {
        i_split,
        n_split,
        out_folder: expand_home(&value("OUT_FOLDER")),
        vcf_folder,
        meta,
        pattern: value("PATTERN"),
        columns: MetaColumns {
            file_name: value("META_FILE_COL"),
            ..Default::default()
        },
    };

    //// configure vep (for inside vcf2maf and for custom if set to use custom vep commands)
    let custom_opt = matches.value_of("CUSTOM_OPT").map(String::from);
    let vep_config = VepConfig {
        path: resolve_program(&expand_home(&value("VEP_PATH"))),
        data: expand_home(&value("VEP_DATA")),
        n_fork: vep_n_fork,
        fasta: expand_home(&value("FASTA")),
        assembly: value("ASSEMBLY"),
        cache_version: matches.value_of("CACHE_VERSION").map(String::from),
        custom_run: custom_opt.is_some(),
        custom_opt,
        custom_overwrite: !keep,
        ..Default::default()
    };

    //// configure vcf2maf
    let vcf2maf_config = Vcf2mafConfig {
        path: expand_home(&value("VCF2MAF_PATH")),
        run: !matches.is_present("NO_VCF2MAF"),
        overwrite: !keep,
        ..Default::default()
    };

    eprintln!("Parameters");
    eprintln!("i_split: {}", config.i_split);
    eprintln!("n_split: {}", config.n_split);
    eprintln!("vep_data: {}", vep_config.data.display());
    eprintln!("vep_n_fork: {}", vep_config.n_fork);
    eprintln!("fasta: {}", vep_config.fasta.display());
    eprintln!("vcf_folder: {}", config.vcf_folder.display());
    eprintln!("out_folder: {}", config.out_folder.display());
    eprintln!("meta: {}", config.meta.display());
    eprintln!("meta_file_col: {}", config.columns.file_name);
    eprintln!("pattern: {}", config.pattern);
    eprintln!("vep_path: {}", vep_config.path.display());
    eprintln!("assembly: {}", vep_config.assembly);
    eprintln!("cache_version: {}", vep_config.cache_version.as_deref().unwrap_or("newest"));
    eprintln!("custom_opt: {}", vep_config.custom_opt.as_deref().unwrap_or("none"));
    eprintln!("vcf2maf_path: {}", vcf2maf_config.path.display());
    eprintln!("no_vcf2maf: {}", !vcf2maf_config.run);
    eprintln!("keep: {}", keep);
    debug!("{:?}\n{:?}\n{:?}", config, vep_config, vcf2maf_config);

    let version = VersionInfo {
        program: "varannot",
        version: crate_version!(),
        author : crate_authors!(),
        command: &args_string,
    };

    match run(&config, &vep_config, &vcf2maf_config, &version) {
        Ok(failed) => {
            if !failed.is_empty() {
                eprintln!("ERROR: {} VCF files failed: {}", failed.len(), failed.join(", "));
                process::exit(1);
            }
        },
        Err(err) => {
            eprintln!("ERROR: {}", err);
            process::exit(1);
        },
    }
}
