use std::path::{Path, PathBuf};
use std::fs;
use std::fs::File;
use std::io::{BufReader, Read};
use regex::Regex;
use thiserror::Error;
use log::debug;


/// Everything which can go wrong while preparing or annotating a VCF.
/// Most of these are per-file failures, the driver decides
/// if it continues with the next file or stops.
#[derive(Debug, Error)]
pub enum AnnotError {
    #[error("invalid split {i_split}/{n_split}, expecting 1 <= i_split <= n_split")]
    InvalidSplit {
        i_split: usize,
        n_split: usize,
    },
    #[error("no metadata entry found for {0}")]
    MissingMetadata(String),
    #[error("{count} metadata entries found for {file}, expecting exactly one")]
    AmbiguousMetadata {
        file: String,
        count: usize,
    },
    #[error("metadata file lacks the column {0}")]
    MissingColumn(String),
    #[error("malformed tumor barcode {0}, expecting at least 4 hyphen-separated segments")]
    MalformedBarcode(String),
    #[error("sample column {sample} not found in {vcf}, found only {available}")]
    SampleNotFound {
        sample: String,
        vcf: String,
        available: String,
    },
    #[error("could not start {tool} ({program:?}) on {vcf}: {source}")]
    ToolStart {
        tool: String,
        program: PathBuf,
        vcf: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} failed on {vcf} with {status}, see {log:?}")]
    ToolFailed {
        tool: String,
        vcf: String,
        status: String,
        log: PathBuf,
    },
    #[error("MAF file {0:?} lacks a header line")]
    EmptyMaf(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
    #[error(transparent)]
    Hts(#[from] rust_htslib::errors::Error),
}

#[derive(Debug,Clone,Copy)]
pub struct VersionInfo <'a>{
    /// the used program/sub-program
    pub program  : &'a str,
    /// the version of the program
    pub version  : &'a str,
    /// the author
    pub author : &'a str,
    /// the executed command
    pub command : &'a str,
}

/// The five places where the annotation writes into.
/// The string representation is the name used in the logs.
#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
pub enum FolderRole {
    /// tables extracted directly from the VCF
    ManualOut,
    /// scratch space of vcf2maf
    Vcf2mafTmp,
    /// raw vcf2maf MAF files
    Vcf2mafOut,
    /// output of custom VEP runs
    VepOut,
    /// final MAF files
    Maf,
}

impl FolderRole {
    pub const ALL: &'static [FolderRole] = &[
        FolderRole::ManualOut,
        FolderRole::Vcf2mafTmp,
        FolderRole::Vcf2mafOut,
        FolderRole::VepOut,
        FolderRole::Maf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FolderRole::ManualOut  => "manual_out_folder",
            FolderRole::Vcf2mafTmp => "vcf2maf_tmp_folder",
            FolderRole::Vcf2mafOut => "vcf2maf_out_folder",
            FolderRole::VepOut     => "vep_out_folder",
            FolderRole::Maf        => "maf_folder",
        }
    }

    /// location relative to the results root
    fn sub_path(&self) -> &'static str {
        match self {
            FolderRole::ManualOut  => "tmp/out_manual",
            FolderRole::Vcf2mafTmp => "tmp/tmp_vcf2maf",
            FolderRole::Vcf2mafOut => "tmp/out_vcf2maf",
            FolderRole::VepOut     => "tmp/out_vep",
            FolderRole::Maf        => "maf",
        }
    }
}

/// The folder layout below one results root.
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct Folders {
    /// root given by the user
    pub root: PathBuf,
    manual_out : PathBuf,
    vcf2maf_tmp: PathBuf,
    vcf2maf_out: PathBuf,
    vep_out    : PathBuf,
    maf        : PathBuf,
}

impl Folders {
    pub fn new(
        out_folder: &Path
    ) -> Folders {
        Folders {
            root:        out_folder.to_path_buf(),
            manual_out:  out_folder.join(FolderRole::ManualOut.sub_path()),
            vcf2maf_tmp: out_folder.join(FolderRole::Vcf2mafTmp.sub_path()),
            vcf2maf_out: out_folder.join(FolderRole::Vcf2mafOut.sub_path()),
            vep_out:     out_folder.join(FolderRole::VepOut.sub_path()),
            maf:         out_folder.join(FolderRole::Maf.sub_path()),
        }
    }

    pub fn get(&self, role: FolderRole) -> &Path {
        match role {
            FolderRole::ManualOut  => &self.manual_out,
            FolderRole::Vcf2mafTmp => &self.vcf2maf_tmp,
            FolderRole::Vcf2mafOut => &self.vcf2maf_out,
            FolderRole::VepOut     => &self.vep_out,
            FolderRole::Maf        => &self.maf,
        }
    }

    /// all roles with their path, always in the same order
    pub fn iter(&self) -> impl Iterator<Item = (FolderRole, &Path)> + '_ {
        FolderRole::ALL.iter().map(move |role| (*role, self.get(*role)))
    }

    /// creates all folders, does nothing for the
    /// ones which exist already
    ///
    /// Unittest: TRUE
    ///
    pub fn create_all(&self) -> Result<(), AnnotError> {
        for (role, path) in self.iter() {
            debug!("creating {} at {:?}", role.as_str(), path);
            fs::create_dir_all(path)?;
        }
        Ok(())
    }
}

/// this function returns all file names within a folder
/// which match the provided pattern (e.g. `\.vcf$`).
/// The names are sorted in natural order, this is important as
/// different invocations must agree on the list before splitting it.
/// Sub-folders are ignored.
///
/// Unittest: TRUE
///
pub fn list_vcf_files(
    folder : &Path,
    pattern: &str
) -> Result<Vec<String>, AnnotError> {
    let re = Regex::new(pattern)?;
    let mut files : Vec<String> = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        // non UTF-8 names can not be matched against metadata anyway
        if let Some(name) = entry.file_name().to_str() {
            if re.is_match(name) {
                files.push(name.to_string());
            }
        }
    }
    files.sort_by(|a, b| human_sort::compare(a, b));
    debug!("found {} files matching {} in {:?}", files.len(), pattern, folder);
    Ok(files)
}

/// Returns the contiguous part of `files` which belongs to split
/// `i_split` (1-based) out of `n_split`.
/// Every split gets `N / n_split` files and the last one takes
/// additionally the remainder.
///
/// Unittest: TRUE
///
pub fn split_files<T>(
    files  : &[T],
    i_split: usize,
    n_split: usize
) -> Result<&[T], AnnotError> {
    if n_split == 0 || i_split == 0 || i_split > n_split {
        return Err(AnnotError::InvalidSplit { i_split, n_split });
    }
    let count_one_split = files.len() / n_split;
    let start = (i_split - 1) * count_one_split;
    if i_split == n_split {
        Ok(&files[start..])
    }else{
        Ok(&files[start..i_split * count_one_split])
    }
}

/// the file name without its last extension, used
/// to name all results derived from one VCF
pub fn file_stem(
    vcf_file: &str
) -> &str {
    match vcf_file.rfind('.') {
        Some(0) | None => vcf_file,
        Some(x) => &vcf_file[..x],
    }
}

/// replaces a leading `~` by the home folder, other
/// paths are returned as they are
///
/// Unittest: TRUE
///
pub fn expand_home(
    path: &str
) -> PathBuf {
    let home = match std::env::var_os("HOME") {
        Some(x) => PathBuf::from(x),
        None => return PathBuf::from(path),
    };
    if path == "~" {
        home
    }else if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    }else{
        PathBuf::from(path)
    }
}

/// A bare program name (e.g. `vep`) is looked up in the folders of
/// `search_path`, which has the format of `PATH`. Programs given with
/// a folder are returned as they are, as well as names which are not found.
///
/// Unittest: TRUE
///
pub fn resolve_program_in(
    program    : &Path,
    search_path: Option<&std::ffi::OsStr>
) -> PathBuf {
    let is_bare = program.parent().map_or(true, |x| x.as_os_str().is_empty());
    if !is_bare {
        return program.to_path_buf();
    }
    if let Some(search_path) = search_path {
        for folder in std::env::split_paths(search_path) {
            let candidate = folder.join(program);
            if candidate.is_file() {
                debug!("resolved {:?} to {:?}", program, candidate);
                return candidate;
            }
        }
    }
    program.to_path_buf()
}

/// same as `resolve_program_in` with the `PATH` of this process
pub fn resolve_program(
    program: &Path
) -> PathBuf {
    resolve_program_in(program, std::env::var_os("PATH").as_deref())
}

/// adapted from here https://users.rust-lang.org/t/efficient-way-of-checking-if-two-files-have-the-same-content/74735
/// very useful for tests with external files and to verify that the results is identical
/// to a previously manually generated result file
pub fn is_same_file(
    file1: &Path,
    file2: &Path
) -> Result<bool, std::io::Error> {
    debug!("comparing file1 {:?} and file2 with each other {:?}", file1.to_str(), file2.to_str());
    let f1 = File::open(file1)?;
    let f2 = File::open(file2)?;
    if f1.metadata()?.len() != f2.metadata()?.len() {
        return Ok(false);
    }

    // Use buf readers since they are much faster
    let f1r = BufReader::new(f1);
    let f2r = BufReader::new(f2);

    // Do a byte to byte comparison of the two files
    for (b1, b2) in f1r.bytes().zip(f2r.bytes()) {
        if b1? != b2? {
            return Ok(false);
        }
    }
    Ok(true)
}



#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;
    use std::io::Write;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|x| format!("s{}.vcf", x)).collect()
    }

    /////////////////////////////////////////
    ///       SPLITTING            //////////
    /////////////////////////////////////////
    #[test]
    fn split_single_is_everything(){
        let files = names(7);
        let result = split_files(&files, 1, 1).unwrap();
        assert_eq!(result, &files[..]);
    }

    #[test]
    fn split_union_is_complete(){
        for n in 0..15 {
            let files = names(n);
            for n_split in 1..6 {
                let mut union : Vec<String> = Vec::new();
                for i_split in 1..=n_split {
                    union.extend_from_slice(split_files(&files, i_split, n_split).unwrap());
                }
                assert_eq!(union, files, "N={} S={}", n, n_split);
            }
        }
    }

    #[test]
    fn split_last_takes_remainder(){
        let files = names(11);
        // 11 / 3 = 3 and 2 remaining
        assert_eq!(split_files(&files, 1, 3).unwrap().len(), 3);
        assert_eq!(split_files(&files, 2, 3).unwrap().len(), 3);
        assert_eq!(split_files(&files, 3, 3).unwrap(), &files[6..]);
        assert_eq!(split_files(&files, 3, 3).unwrap().len(), 11 / 3 + 11 % 3);
    }

    #[test]
    fn split_more_splits_than_files(){
        let files = names(2);
        assert!(split_files(&files, 1, 4).unwrap().is_empty());
        assert!(split_files(&files, 3, 4).unwrap().is_empty());
        assert_eq!(split_files(&files, 4, 4).unwrap(), &files[..]);
    }

    #[test]
    fn split_invalid(){
        let files = names(4);
        assert!(matches!(split_files(&files, 0, 2), Err(AnnotError::InvalidSplit { .. })));
        assert!(matches!(split_files(&files, 3, 2), Err(AnnotError::InvalidSplit { .. })));
        assert!(matches!(split_files(&files, 1, 0), Err(AnnotError::InvalidSplit { .. })));
    }

    /////////////////////////////////////////
    ///       FILES AND FOLDERS    //////////
    /////////////////////////////////////////
    #[test]
    fn list_vcf_files_filters_and_sorts(){
        let dir = tempfile::tempdir().unwrap();
        for name in ["s10.vcf", "s2.vcf", "s1.vcf", "vcf_meta.txt", "s3.vcf.gz"].iter() {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("sub.vcf")).unwrap();
        let result = list_vcf_files(dir.path(), r"\.vcf$").unwrap();
        assert_eq!(result, vec!["s1.vcf", "s2.vcf", "s10.vcf"]);
    }

    #[test]
    fn list_vcf_files_bad_pattern(){
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(list_vcf_files(dir.path(), "(.vcf"), Err(AnnotError::Regex(_))));
    }

    #[test]
    fn folders_layout_and_creation(){
        let dir = tempfile::tempdir().unwrap();
        let folders = Folders::new(dir.path());
        assert_eq!(folders.get(FolderRole::Maf), dir.path().join("maf"));
        assert_eq!(folders.get(FolderRole::Vcf2mafTmp), dir.path().join("tmp/tmp_vcf2maf"));
        folders.create_all().unwrap();
        // a second time must not fail
        folders.create_all().unwrap();
        for (_role, path) in folders.iter() {
            assert!(path.is_dir());
        }
        assert_eq!(folders.iter().count(), 5);
    }

    #[test]
    fn file_stem_cases(){
        assert_eq!(file_stem("a.vcf"), "a");
        assert_eq!(file_stem("TCGA-XX.annot.vcf"), "TCGA-XX.annot");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn expand_home_cases(){
        let home = PathBuf::from(std::env::var_os("HOME").unwrap());
        assert_eq!(expand_home("~/.vep"), home.join(".vep"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/data/~x"), PathBuf::from("/data/~x"));
        assert_eq!(expand_home("rel/path"), PathBuf::from("rel/path"));
    }

    #[test]
    fn resolve_program_search(){
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        File::create(bin.join("vep")).unwrap();
        let search = std::env::join_paths(vec![dir.path().join("empty"), bin.clone()]).unwrap();
        assert_eq!(resolve_program_in(Path::new("vep"), Some(&search)), bin.join("vep"));
        // not found, or no PATH at all, keeps the name
        assert_eq!(resolve_program_in(Path::new("vcf2maf.pl"), Some(&search)), PathBuf::from("vcf2maf.pl"));
        assert_eq!(resolve_program_in(Path::new("vep"), None), PathBuf::from("vep"));
        // a program with a folder is taken as it is
        assert_eq!(resolve_program_in(Path::new("/opt/vep/vep"), Some(&search)), PathBuf::from("/opt/vep/vep"));
    }

    #[test]
    fn same_file_comparison(){
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let c = dir.path().join("c.txt");
        File::create(&a).unwrap().write_all(b"chr1\t10\n").unwrap();
        File::create(&b).unwrap().write_all(b"chr1\t10\n").unwrap();
        File::create(&c).unwrap().write_all(b"chr1\t11\n").unwrap();
        assert!(is_same_file(&a, &b).unwrap());
        assert!(!is_same_file(&a, &c).unwrap());
    }
}
