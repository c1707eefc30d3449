//! Human-readable document references (`CUST00001`, `PO00001`, `SO00001`).

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Customer,
    PurchaseOrder,
    SaleOrder,
}

impl DocumentType {
    /// Key of the numbering sequence for this document type.
    pub fn sequence_code(&self) -> &'static str {
        match self {
            DocumentType::Customer => "inventory.customer",
            DocumentType::PurchaseOrder => "inventory.purchase.order",
            DocumentType::SaleOrder => "inventory.sale.order",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentType::Customer => "CUST",
            DocumentType::PurchaseOrder => "PO",
            DocumentType::SaleOrder => "SO",
        }
    }

    /// Placeholder used when the numbering service yields nothing.
    pub fn fallback_reference(&self) -> &'static str {
        match self {
            DocumentType::Customer => "CUST000",
            DocumentType::PurchaseOrder => "PO000",
            DocumentType::SaleOrder => "SO000",
        }
    }
}

/// Numbering service. `None` means "no number available"; callers then use
/// [`DocumentType::fallback_reference`].
pub trait SequenceService: Send + Sync {
    fn next_reference(&self, document_type: DocumentType) -> Option<String>;
}

pub fn reference_or_fallback(sequences: &dyn SequenceService, document_type: DocumentType) -> String {
    match sequences.next_reference(document_type) {
        Some(reference) if !reference.trim().is_empty() => reference,
        _ => {
            tracing::warn!(
                sequence = document_type.sequence_code(),
                "sequence yielded nothing, using fallback reference"
            );
            document_type.fallback_reference().to_string()
        }
    }
}

/// Per-document-type counters, prefix + 5 digits.
#[derive(Debug, Default)]
pub struct InMemorySequence {
    counters: Mutex<HashMap<DocumentType, u64>>,
}

impl InMemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceService for InMemorySequence {
    fn next_reference(&self, document_type: DocumentType) -> Option<String> {
        let mut counters = self.counters.lock().ok()?;
        let next = counters.entry(document_type).or_insert(0);
        *next += 1;
        Some(format!("{}{:05}", document_type.prefix(), next))
    }
}
