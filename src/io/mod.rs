pub mod fasta;
pub mod fastq;
pub mod reference;
pub mod sam;
