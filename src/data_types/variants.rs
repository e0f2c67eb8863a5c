
#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum VariantError {
    #[error("reference allele is empty (length = 0)")]
    EmptyRefAllele,
    #[error("variant must have at least one alternate allele")]
    NoAltAlleles,
    #[error("alternate allele {index} is empty (length = 0)")]
    EmptyAltAllele { index: usize },
    #[error("genotype allele index {allele_index} is out of range (site has {num_alts} alternate alleles)")]
    GenotypeOutOfRange { allele_index: u8, num_alts: usize }
}

/// A single variant call against the reference, scoped to one contig.
/// Contig identity is carried by the per-contig containers, not by the variant itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variant {
    /// The coordinate of the event on the contig, 0-based
    position: u64,
    /// The reference allele sequence
    ref_allele: Vec<u8>,
    /// The alternate allele sequences, in file order
    alt_alleles: Vec<Vec<u8>>,
    /// Diploid genotype as allele indices; 0 = reference, k = alt_alleles[k-1]
    genotype: [u8; 2]
}

impl Variant {
    /// Creates a new variant after validating allele and genotype shape.
    /// # Arguments
    /// * `position` - the 0-based coordinate of the variant on its contig
    /// * `ref_allele` - the reference allele sequence
    /// * `alt_alleles` - the ordered alternate allele sequences
    /// * `genotype` - the two allele indices for the diploid sample
    /// # Errors
    /// * if any allele is empty or absent
    /// * if a genotype index points past the alternate allele list
    pub fn new(position: u64, ref_allele: Vec<u8>, alt_alleles: Vec<Vec<u8>>, genotype: [u8; 2]) -> Result<Variant, VariantError> {
        if ref_allele.is_empty() {
            return Err(VariantError::EmptyRefAllele);
        }
        if alt_alleles.is_empty() {
            return Err(VariantError::NoAltAlleles);
        }
        if let Some(index) = alt_alleles.iter().position(|a| a.is_empty()) {
            return Err(VariantError::EmptyAltAllele { index });
        }
        for &allele_index in genotype.iter() {
            if allele_index as usize > alt_alleles.len() {
                return Err(VariantError::GenotypeOutOfRange { allele_index, num_alts: alt_alleles.len() });
            }
        }

        Ok(Variant {
            position,
            ref_allele,
            alt_alleles,
            genotype
        })
    }

    /// Returns the allele sequence for a genotype allele index, where 0 is the reference allele.
    /// # Arguments
    /// * `allele_index` - a validated genotype index
    /// # Panics
    /// * if the index points past the alternate allele list; construction prevents this for stored genotypes
    pub fn allele_sequence(&self, allele_index: u8) -> &[u8] {
        if allele_index == 0 {
            &self.ref_allele
        } else {
            &self.alt_alleles[allele_index as usize - 1]
        }
    }

    /// Returns the longest allele length across the reference and all alternates.
    /// Cohort window expansion is driven by this value.
    pub fn longest_allele_len(&self) -> usize {
        self.alt_alleles.iter()
            .map(|a| a.len())
            .max()
            .unwrap_or(0)
            .max(self.ref_allele.len())
    }

    /// Returns true if the two genotype alleles differ.
    pub fn is_heterozygous(&self) -> bool {
        self.genotype[0] != self.genotype[1]
    }

    /// Returns true if this site can only change a single base: the reference
    /// and every alternate are length 1. Sites failing this are "gap" sites
    /// in the diagnostics split.
    pub fn is_snv(&self) -> bool {
        self.ref_allele.len() == 1 && self.alt_alleles.iter().all(|a| a.len() == 1)
    }

    // getters
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The 0-based, exclusive end of the reference span
    pub fn stop(&self) -> u64 {
        self.position + self.ref_allele.len() as u64
    }

    pub fn ref_allele(&self) -> &[u8] {
        &self.ref_allele
    }

    pub fn alt_alleles(&self) -> &[Vec<u8>] {
        &self.alt_alleles
    }

    pub fn genotype(&self) -> [u8; 2] {
        self.genotype
    }
}
