use std::path::Path;
use rust_htslib::bcf;
use rust_htslib::bcf::Read as BcfRead;
use rust_htslib::bcf::header::HeaderView;
use log::debug;

use crate::lib::common::AnnotError;


/// htslib encodes missing and end-of-vector values with
/// these special values
const INT_MISSING    : i32 = i32::MIN;
const INT_VECTOR_END : i32 = i32::MIN + 1;
const FLOAT_MISSING    : u32 = 0x7F80_0001;
const FLOAT_VECTOR_END : u32 = 0x7F80_0002;

/// the columns in a VCF which belong to the
/// normal and the tumor sample
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub struct SampleIndices {
    pub normal: usize,
    pub tumor : usize,
}

/// checks that both the normal and the tumor column
/// exist in the VCF header and returns their position
///
/// Unittest: TRUE
///
pub fn sample_indices(
    header    : &HeaderView,
    vcf       : &str,
    col_normal: &str,
    col_tumor : &str
) -> Result<SampleIndices, AnnotError> {
    let lookup = |sample: &str| {
        header.sample_id(sample.as_bytes()).ok_or_else(|| AnnotError::SampleNotFound {
            sample: sample.to_string(),
            vcf: vcf.to_string(),
            available: sample_names(header).join(","),
        })
    };
    Ok(SampleIndices {
        normal: lookup(col_normal)?,
        tumor : lookup(col_tumor)?,
    })
}

/// returns the sample names of a VCF, mostly for messages
pub fn sample_names(
    header: &HeaderView
) -> Vec<String> {
    header.samples()
        .iter()
        .map(|x| String::from_utf8_lossy(x).to_string())
        .collect()
}

/// Formats the FORMAT value `field` of one sample.
/// We do not know the type of the field upfront, so we try
/// integer, float and string in this order. If none of them works
/// the field is absent and we return ".".
fn format_value(
    record: &bcf::Record,
    field : &str,
    sample: usize
) -> String {
    if field == "GT" {
        return match record.genotypes() {
            Ok(gts) => gts.get(sample).to_string(),
            Err(_)  => String::from("."),
        };
    }
    let tag = field.as_bytes();
    if let Ok(values) = record.format(tag).integer() {
        if let Some(v) = values.get(sample) {
            return join_values(v.iter()
                .take_while(|x| **x != INT_VECTOR_END)
                .map(|x| if *x == INT_MISSING { String::from(".") } else { x.to_string() }));
        }
    }
    if let Ok(values) = record.format(tag).float() {
        if let Some(v) = values.get(sample) {
            return join_values(v.iter()
                .take_while(|x| x.to_bits() != FLOAT_VECTOR_END)
                .map(|x| if x.to_bits() == FLOAT_MISSING { String::from(".") } else { x.to_string() }));
        }
    }
    if let Ok(values) = record.format(tag).string() {
        if let Some(v) = values.get(sample) {
            let s = String::from_utf8_lossy(v);
            let s = s.trim_end_matches(char::from(0));
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    String::from(".")
}

fn join_values<I: Iterator<Item = String>>(values: I) -> String {
    let joined = values.collect::<Vec<String>>().join(",");
    if joined.is_empty() {
        String::from(".")
    }else{
        joined
    }
}

/// The header of the manual table: position of the variant
/// followed by normal and tumor value of each FORMAT field.
pub fn manual_header(
    fields: &[&str]
) -> Vec<String> {
    let mut header : Vec<String> = vec![
        String::from("CHROM"),
        String::from("POS"),
        String::from("REF"),
        String::from("ALT"),
    ];
    for field in fields.iter() {
        header.push(format!("n_{}", field));
        header.push(format!("t_{}", field));
    }
    header
}

/// this function reads a VCF and writes for each record
/// a tab-separated line with the position, alleles and the
/// requested FORMAT fields of the normal and tumor column.
/// The read count fields come first, then the other ones.
/// Returns the number of written records.
///
/// Unittest: TRUE
///
pub fn extract_manual_table(
    vcf          : &Path,
    out          : &Path,
    col_normal   : &str,
    col_tumor    : &str,
    infos_n_reads: &[&str],
    infos_other  : &[&str]
) -> Result<usize, AnnotError> {
    let mut reader = bcf::Reader::from_path(vcf)?;
    let vcf_name = vcf.to_string_lossy();
    let indices = sample_indices(reader.header(), &vcf_name, col_normal, col_tumor)?;
    debug!("{}: normal column {} tumor column {}", vcf_name, indices.normal, indices.tumor);

    let fields : Vec<&str> = infos_n_reads.iter().chain(infos_other.iter()).copied().collect();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_path(out)?;
    writer.write_record(manual_header(&fields))?;

    let mut n_records = 0_usize;
    for entry in reader.records() {
        let record = entry?;
        let chrom = match record.rid() {
            Some(rid) => String::from_utf8_lossy(record.header().rid2name(rid)?).to_string(),
            None => String::from("."),
        };
        let alleles = record.alleles();
        let ref_allele = alleles.first()
            .map(|x| String::from_utf8_lossy(x).to_string())
            .unwrap_or_else(|| String::from("."));
        let alt_alleles = alleles.iter()
            .skip(1)
            .map(|x| String::from_utf8_lossy(x).to_string())
            .collect::<Vec<String>>();
        let mut line : Vec<String> = vec![
            chrom,
            (record.pos() + 1).to_string(),
            ref_allele,
            join_values(alt_alleles.into_iter()),
        ];
        for field in fields.iter() {
            line.push(format_value(&record, field, indices.normal));
            line.push(format_value(&record, field, indices.tumor));
        }
        writer.write_record(&line)?;
        n_records += 1;
    }
    writer.flush()?;
    debug!("{}: wrote {} records into {:?}", vcf_name, n_records, out);
    Ok(n_records)
}



#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    const VCF: &[u8] = b"##fileformat=VCFv4.1\n\
##contig=<ID=1,length=249250621>\n\
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
##FORMAT=<ID=AD,Number=.,Type=Integer,Description=\"Allelic depths\">\n\
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">\n\
##FORMAT=<ID=FA,Number=1,Type=Float,Description=\"Allele fraction\">\n\
##FORMAT=<ID=SS,Number=1,Type=Integer,Description=\"Somatic status\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNORMAL\tPRIMARY\n\
1\t100\t.\tA\tT\t.\tPASS\t.\tGT:AD:DP:FA:SS\t0/0:30,0:30:0:0\t0/1:20,10:30:0.25:2\n\
1\t200\t.\tG\tC,A\t.\tPASS\t.\tGT:AD:DP:SS\t0/0:25,0,0:25:0\t1/2:5,7,8:20:2\n";

    fn write_vcf(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("a.vcf");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(VCF).unwrap();
        path
    }

    #[test]
    fn sample_indices_found(){
        let dir = tempfile::tempdir().unwrap();
        let vcf = write_vcf(dir.path());
        let reader = bcf::Reader::from_path(&vcf).unwrap();
        let result = sample_indices(reader.header(), "a.vcf", "NORMAL", "PRIMARY").unwrap();
        assert_eq!(result, SampleIndices { normal: 0, tumor: 1 });
        assert_eq!(sample_names(reader.header()), vec!["NORMAL", "PRIMARY"]);
    }

    #[test]
    fn sample_indices_missing(){
        let dir = tempfile::tempdir().unwrap();
        let vcf = write_vcf(dir.path());
        let reader = bcf::Reader::from_path(&vcf).unwrap();
        match sample_indices(reader.header(), "a.vcf", "NORMAL", "METASTATIC") {
            Err(AnnotError::SampleNotFound { sample, .. }) => assert_eq!(sample, "METASTATIC"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn manual_header_order(){
        let result = manual_header(&["AD", "GT"]);
        assert_eq!(result, vec!["CHROM", "POS", "REF", "ALT", "n_AD", "t_AD", "n_GT", "t_GT"]);
    }

    #[test]
    fn extract_manual_table_values(){
        let dir = tempfile::tempdir().unwrap();
        let vcf = write_vcf(dir.path());
        let out = dir.path().join("a.txt");
        let n = extract_manual_table(&vcf, &out, "NORMAL", "PRIMARY", &["AD", "DP", "FA"], &["SS", "GT"]).unwrap();
        assert_eq!(n, 2);
        let content = fs::read_to_string(&out).unwrap();
        let lines : Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "CHROM\tPOS\tREF\tALT\tn_AD\tt_AD\tn_DP\tt_DP\tn_FA\tt_FA\tn_SS\tt_SS\tn_GT\tt_GT");
        assert_eq!(lines[1], "1\t100\tA\tT\t30,0\t20,10\t30\t30\t0\t0.25\t0\t2\t0/0\t0/1");
        // FA is not set for the 2nd record
        assert_eq!(lines[2], "1\t200\tG\tC,A\t25,0,0\t5,7,8\t25\t20\t.\t.\t0\t2\t0/0\t1/2");
    }

    #[test]
    fn extract_manual_table_wrong_column(){
        let dir = tempfile::tempdir().unwrap();
        let vcf = write_vcf(dir.path());
        let out = dir.path().join("a.txt");
        let result = extract_manual_table(&vcf, &out, "NORMAL", "METASTATIC", &["DP"], &[]);
        assert!(matches!(result, Err(AnnotError::SampleNotFound { .. })));
    }

    #[test]
    fn extract_manual_table_missing_vcf(){
        let dir = tempfile::tempdir().unwrap();
        let result = extract_manual_table(&dir.path().join("nope.vcf"), &dir.path().join("a.txt"), "NORMAL", "PRIMARY", &["DP"], &[]);
        assert!(matches!(result, Err(AnnotError::Hts(_))));
    }
}
