use std::fmt;
use std::path::Path;
use rustc_hash::FxHashMap;
use log::debug;

use crate::lib::common::AnnotError;


/// label of the normal sample column inside the VCF files
pub const COL_NORMAL: &str = "NORMAL";

/// The names of the metadata columns we rely on.
/// The defaults are the ones of the TCGA GA cohort.
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct MetaColumns {
    /// VCF file name, the key of the table
    pub file_name: String,
    pub tumor_sample: String,
    pub tumor_sample_barcode: String,
    pub normal_sample_barcode: String,
}

impl Default for MetaColumns {
    fn default() -> Self {
        MetaColumns {
            file_name:             String::from("file_name_GA"),
            tumor_sample:          String::from("tumor_sample"),
            tumor_sample_barcode:  String::from("tumor_sample_barcode"),
            normal_sample_barcode: String::from("normal_sample_barcode"),
        }
    }
}

impl MetaColumns {
    fn required(&self) -> [&str; 4] {
        [
            self.file_name.as_str(),
            self.tumor_sample.as_str(),
            self.tumor_sample_barcode.as_str(),
            self.normal_sample_barcode.as_str(),
        ]
    }
}

/// The identifiers of one tumor/normal pair which end up
/// in the final MAF file.
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct Identifiers {
    /// `Tumor_Sample`
    pub tumor_sample: String,
    /// `Tumor_Sample_Barcode`
    pub tumor_sample_barcode: String,
    /// `Matched_Norm_Sample_Barcode`
    pub matched_norm_sample_barcode: String,
    /// `Tumor_Sample_Site`, 2 characters from the barcode
    pub tumor_sample_site: String,
}

impl Identifiers {
    /// column name and value, in the order they are written
    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("Tumor_Sample",                self.tumor_sample.as_str()),
            ("Tumor_Sample_Barcode",        self.tumor_sample_barcode.as_str()),
            ("Matched_Norm_Sample_Barcode", self.matched_norm_sample_barcode.as_str()),
            ("Tumor_Sample_Site",           self.tumor_sample_site.as_str()),
        ]
    }

    pub fn tumor_type(&self) -> TumorType {
        TumorType::from_site(&self.tumor_sample_site)
    }
}

/// Decides how the tumor sample column is named
/// in the VCF files.
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum TumorType {
    Primary,
    Metastatic,
}

impl TumorType {
    /// site code "01" is a primary solid tumor, everything
    /// else is treated as metastatic
    pub fn from_site(site: &str) -> TumorType {
        if site == "01" {
            TumorType::Primary
        }else{
            TumorType::Metastatic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TumorType::Primary    => "PRIMARY",
            TumorType::Metastatic => "METASTATIC",
        }
    }
}

impl fmt::Display for TumorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// extracts the sample site from a barcode, which are the first 2
/// characters of the 4th hyphen-separated segment,
/// e.g. TCGA-A6-2671-01A-01D-1408-10 -> 01
///
/// Unittest: TRUE
///
pub fn tumor_site(
    barcode: &str
) -> Result<String, AnnotError> {
    barcode.split('-')
        .nth(3)
        .and_then(|segment| segment.get(..2))
        .map(|site| site.to_string())
        .ok_or_else(|| AnnotError::MalformedBarcode(barcode.to_string()))
}

/// The metadata table, one row per VCF file.
#[derive(Debug)]
pub struct MetaTable {
    columns: MetaColumns,
    rows   : Vec<FxHashMap<String,String>>,
}

impl MetaTable {
    /// reads a tab-separated table with header. All columns named
    /// in `columns` have to be present, others are kept but ignored.
    ///
    /// Unittest: TRUE
    ///
    pub fn from_path(
        path   : &Path,
        columns: MetaColumns
    ) -> Result<MetaTable, AnnotError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        for needed in columns.required().iter() {
            if !headers.iter().any(|h| h == *needed) {
                return Err(AnnotError::MissingColumn(needed.to_string()));
            }
        }
        let mut rows : Vec<FxHashMap<String,String>> = Vec::new();
        for result in reader.deserialize() {
            let row : FxHashMap<String,String> = result?;
            rows.push(row);
        }
        debug!("metadata {:?} contained {} rows", path, rows.len());
        Ok(MetaTable { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn value<'a>(row: &'a FxHashMap<String,String>, column: &str) -> &'a str {
        // presence of the columns is checked while loading
        row.get(column).map(|x| x.as_str()).unwrap_or("")
    }

    /// looks up the row of `vcf_file` and derives the identifiers.
    /// Exactly one row has to match.
    ///
    /// Unittest: TRUE
    ///
    pub fn identifiers(
        &self,
        vcf_file: &str
    ) -> Result<Identifiers, AnnotError> {
        let matching : Vec<&FxHashMap<String,String>> = self.rows.iter()
            .filter(|row| Self::value(row, &self.columns.file_name) == vcf_file)
            .collect();
        let row = match matching.len() {
            0 => return Err(AnnotError::MissingMetadata(vcf_file.to_string())),
            1 => matching[0],
            count => return Err(AnnotError::AmbiguousMetadata {
                file: vcf_file.to_string(),
                count,
            }),
        };
        let tumor_sample_barcode = Self::value(row, &self.columns.tumor_sample_barcode);
        Ok(Identifiers {
            tumor_sample:                Self::value(row, &self.columns.tumor_sample).to_string(),
            tumor_sample_barcode:        tumor_sample_barcode.to_string(),
            matched_norm_sample_barcode: Self::value(row, &self.columns.normal_sample_barcode).to_string(),
            tumor_sample_site:           tumor_site(tumor_sample_barcode)?,
        })
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn meta_file(content: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    const META: &[u8] = b"file_name_GA\ttumor_sample\ttumor_sample_barcode\tnormal_sample_barcode\tcenter\n\
        a.vcf\tT1\tAA-BB-CC-01X-DD\tN1\tBI\n\
        b.vcf\tT2\tTCGA-A6-2671-06A-01D-1408-10\tTCGA-A6-2671-10A-01D-1408-10\tBI\n\
        c.vcf\tT3\tTCGA-A6\tN3\tBI\n\
        d.vcf\tT4\tAA-BB-CC-01X\tN4\tBI\n\
        d.vcf\tT5\tAA-BB-CC-01X\tN5\tBI\n";

    #[test]
    fn identifiers_primary(){
        let tmp = meta_file(META);
        let table = MetaTable::from_path(tmp.path(), MetaColumns::default()).unwrap();
        assert_eq!(table.len(), 5);
        let result = table.identifiers("a.vcf").unwrap();
        let truth = Identifiers {
            tumor_sample: String::from("T1"),
            tumor_sample_barcode: String::from("AA-BB-CC-01X-DD"),
            matched_norm_sample_barcode: String::from("N1"),
            tumor_sample_site: String::from("01"),
        };
        assert_eq!(result, truth);
        assert_eq!(result.tumor_type(), TumorType::Primary);
        assert_eq!(result.tumor_type().as_str(), "PRIMARY");
    }

    #[test]
    fn identifiers_metastatic(){
        let tmp = meta_file(META);
        let table = MetaTable::from_path(tmp.path(), MetaColumns::default()).unwrap();
        let result = table.identifiers("b.vcf").unwrap();
        assert_eq!(result.tumor_sample_site, "06");
        assert_eq!(result.matched_norm_sample_barcode, "TCGA-A6-2671-10A-01D-1408-10");
        assert_eq!(result.tumor_type().to_string(), "METASTATIC");
    }

    #[test]
    fn identifiers_errors(){
        let tmp = meta_file(META);
        let table = MetaTable::from_path(tmp.path(), MetaColumns::default()).unwrap();
        assert!(matches!(table.identifiers("z.vcf"), Err(AnnotError::MissingMetadata(_))));
        assert!(matches!(table.identifiers("c.vcf"), Err(AnnotError::MalformedBarcode(_))));
        assert!(matches!(table.identifiers("d.vcf"), Err(AnnotError::AmbiguousMetadata { count: 2, .. })));
    }

    #[test]
    fn missing_column(){
        let tmp = meta_file(b"file_name_GA\ttumor_sample\ttumor_sample_barcode\na.vcf\tT1\tAA-BB-CC-01X\n");
        let result = MetaTable::from_path(tmp.path(), MetaColumns::default());
        match result {
            Err(AnnotError::MissingColumn(x)) => assert_eq!(x, "normal_sample_barcode"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn custom_columns(){
        let tmp = meta_file(b"vcf\ttumor\ttumor_bc\tnormal_bc\nx.vcf\tT9\tP-Q-R-11A\tN9\n");
        let columns = MetaColumns {
            file_name: String::from("vcf"),
            tumor_sample: String::from("tumor"),
            tumor_sample_barcode: String::from("tumor_bc"),
            normal_sample_barcode: String::from("normal_bc"),
        };
        let table = MetaTable::from_path(tmp.path(), columns).unwrap();
        let result = table.identifiers("x.vcf").unwrap();
        assert_eq!(result.tumor_sample, "T9");
        assert_eq!(result.tumor_sample_site, "11");
    }

    #[test]
    fn tumor_site_cases(){
        assert_eq!(tumor_site("AA-BB-CC-01X-DD").unwrap(), "01");
        assert_eq!(tumor_site("AA-BB-CC-01").unwrap(), "01");
        assert!(tumor_site("AA-BB-CC-1").is_err());
        assert!(tumor_site("AA-BB-CC").is_err());
        assert!(tumor_site("").is_err());
        assert_eq!(TumorType::from_site("01"), TumorType::Primary);
        assert_eq!(TumorType::from_site("02"), TumorType::Metastatic);
        assert_eq!(TumorType::from_site(""), TumorType::Metastatic);
    }
}
