//! Source corpus and the deterministic word chunker that feeds ingestion.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default number of words per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// A source document. Immutable once the store is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier used as the chunk id prefix.
    pub id: String,
    /// Human readable title, also prefixed onto every chunk.
    pub title: String,
    /// Raw body text.
    pub body: String,
    /// Coarse topic label.
    pub category: String,
}

impl Document {
    /// Builds a document from borrowed parts.
    pub fn new(id: &str, title: &str, body: &str, category: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            category: category.to_string(),
        }
    }
}

/// Word slice of a document, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// `<document_id>-chunk-<chunk_index>`.
    pub chunk_id: String,
    /// Title, a blank line, then the word slice.
    pub text: String,
    /// Owning document id.
    pub document_id: String,
    /// Owning document title.
    pub title: String,
    /// Owning document category.
    pub category: String,
    /// Position of the chunk inside its document, from zero.
    pub chunk_index: usize,
}

impl Chunk {
    /// The word slice without the title prefix.
    pub fn words(&self) -> &str {
        let prefix_len = self.title.len() + 2;
        self.text.get(prefix_len..).unwrap_or_default()
    }
}

/// Deterministic chunk identifier.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    format!("{document_id}-chunk-{chunk_index}")
}

/// Splits a document body into whitespace-delimited word groups of `chunk_size`.
///
/// A body without words yields no chunks. A `chunk_size` of zero is treated as one.
pub fn chunk_document(doc: &Document, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let words: Vec<&str> = doc.body.split_whitespace().collect();
    words
        .chunks(chunk_size)
        .enumerate()
        .map(|(chunk_index, slice)| Chunk {
            chunk_id: chunk_id(&doc.id, chunk_index),
            text: format!("{}\n\n{}", doc.title, slice.join(" ")),
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            category: doc.category.clone(),
            chunk_index,
        })
        .collect()
}

/// Chunks every document in corpus order.
pub fn chunk_corpus(documents: &[Document], chunk_size: usize) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, chunk_size))
        .collect()
}

/// Read-only collection of documents loaded at startup.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    documents: Vec<Document>,
}

impl DocumentStore {
    /// Wraps an explicit document list.
    pub fn new(documents: Vec<Document>) -> Result<Self> {
        let mut seen = HashSet::new();
        for doc in &documents {
            anyhow::ensure!(!doc.id.trim().is_empty(), "document id must not be empty");
            anyhow::ensure!(
                seen.insert(doc.id.as_str()),
                "duplicate document id {}",
                doc.id
            );
        }
        Ok(Self { documents })
    }

    /// Loads a JSON array of documents.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus {:?}", path))?;
        let documents: Vec<Document> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid corpus JSON in {:?}", path))?;
        Self::new(documents)
    }

    /// The bundled support-center corpus.
    pub fn builtin() -> Self {
        Self {
            documents: builtin_documents(),
        }
    }

    /// All documents in load order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Looks a document up by id.
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.id == id)
    }

    /// Chunks the whole corpus.
    pub fn chunks(&self, chunk_size: usize) -> Vec<Chunk> {
        chunk_corpus(&self.documents, chunk_size)
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn builtin_documents() -> Vec<Document> {
    vec![
        Document::new(
            "doc-1",
            "Account Opening Process",
            "To open an account with our platform, users must be at least 18 years old and provide valid identification. \
             The process takes approximately 5-10 minutes and requires: \
             1. Valid government-issued ID (passport, driver's license, or national ID) \
             2. Proof of address (utility bill or bank statement from last 3 months) \
             3. Email verification \
             4. Phone number verification \
             Once submitted, accounts are typically verified within 24-48 hours. \
             Users will receive an email confirmation once approved.",
            "Account Management",
        ),
        Document::new(
            "doc-2",
            "Trading Hours and Market Access",
            "Our platform provides access to multiple markets with different trading hours: \
             - Stock Market: Monday-Friday, 9:30 AM - 4:00 PM EST \
             - Cryptocurrency: 24/7 trading available \
             - Forex: Sunday 5 PM - Friday 5 PM EST \
             Please note that some assets may have limited liquidity during off-peak hours. \
             Market holidays may affect trading availability.",
            "Trading",
        ),
        Document::new(
            "doc-3",
            "Deposit and Withdrawal Policy",
            "Deposits can be made via bank transfer, debit card, or cryptocurrency. Minimum deposit is $10. \
             Deposits typically reflect within: \
             - Bank transfer: 1-3 business days \
             - Debit card: Instant to 30 minutes \
             - Cryptocurrency: 10-60 minutes depending on network \
             Withdrawals require account verification and are processed within 1-5 business days. \
             Daily withdrawal limit is $50,000 for verified accounts. \
             First-time withdrawals may take longer for security verification.",
            "Payments",
        ),
        Document::new(
            "doc-4",
            "Security Features and Two-Factor Authentication",
            "We implement bank-level security measures including: \
             - 256-bit SSL encryption for all data transmission \
             - Two-factor authentication (2FA) via SMS or authenticator apps \
             - Biometric login options (fingerprint/face ID) \
             - Cold storage for 95% of cryptocurrency assets \
             - Regular security audits and penetration testing \
             We strongly recommend all users enable 2FA. \
             To set up 2FA, go to Settings > Security > Enable Two-Factor Authentication.",
            "Security",
        ),
        Document::new(
            "doc-5",
            "Fee Structure and Pricing",
            "Our transparent fee structure: \
             - Stock trades: $0 commission \
             - Cryptocurrency trades: 0.5% per transaction \
             - Forex trades: Spread-based pricing (typically 0.1-0.3%) \
             - Deposit fees: Free for bank transfers, 2.9% for card payments \
             - Withdrawal fees: Free for bank transfers (minimum $50), blockchain fees apply for crypto \
             - Inactivity fee: $10/month after 12 months of no activity \
             Premium members receive 50% discount on all trading fees.",
            "Pricing",
        ),
        Document::new(
            "doc-6",
            "Customer Support and Contact Methods",
            "Our customer support team is available through multiple channels: \
             - Live chat: 24/7 (average response time: 2 minutes) \
             - Email: support@platform.com (response within 24 hours) \
             - Phone: +1-800-TRADING (Mon-Fri, 8 AM - 8 PM EST) \
             - Help center: Comprehensive guides and FAQs at help.platform.com \
             For urgent issues like account access or suspected fraud, please call our emergency hotline immediately.",
            "Support",
        ),
        Document::new(
            "doc-7",
            "Tax Reporting and Documentation",
            "We provide comprehensive tax documentation for all users: \
             - Annual tax forms (1099-B for US users) available by February 15th \
             - Transaction history export in CSV/PDF format \
             - Realized gains/losses reports \
             - Downloadable monthly and annual statements \
             Users can access tax documents via Dashboard > Tax Center. \
             We recommend consulting with a tax professional for personalized advice. \
             The platform does not provide tax advice.",
            "Compliance",
        ),
        Document::new(
            "doc-8",
            "Mobile App Features and Availability",
            "Our mobile app is available for iOS (12.0+) and Android (8.0+) devices. Features include: \
             - Real-time market data and price alerts \
             - Quick trade execution with biometric confirmation \
             - Portfolio tracking and performance analytics \
             - Push notifications for market movements and account activity \
             - Offline mode for viewing portfolio (trading requires connection) \
             Download from App Store or Google Play Store. \
             The app syncs seamlessly with your web account.",
            "Product Features",
        ),
        Document::new(
            "doc-9",
            "Account Verification Levels and Limits",
            "We offer three verification levels with increasing limits: \
             Level 1 (Basic): Email verified - $1,000 daily deposit limit, view-only access \
             Level 2 (Verified): ID + address verified - $10,000 daily limit, full trading access \
             Level 3 (Premium): Enhanced verification + video call - $100,000 daily limit, margin trading, API access \
             Upgrade your verification level anytime through Settings > Account > Verification. \
             Higher levels unlock advanced features and better rates.",
            "Account Management",
        ),
        Document::new(
            "doc-10",
            "Referral Program and Rewards",
            "Earn rewards by referring friends: \
             - You receive $25 when a referred friend makes their first deposit of $100+ \
             - Your friend receives $25 welcome bonus \
             - No limit on number of referrals \
             - Rewards paid within 7 days of qualifying deposit \
             - Additional bonuses for top referrers (monthly leaderboard) \
             Share your unique referral link from Dashboard > Refer & Earn. \
             Terms and conditions apply.",
            "Rewards",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn doc_with_words(count: usize) -> Document {
        let body = (0..count)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        Document::new("doc-x", "Title", &body, "General")
    }

    #[test]
    fn short_body_yields_single_chunk() {
        let doc = Document::new(
            "doc-x",
            "Trading Hours",
            "Stocks trade nine to four.",
            "Trading",
        );
        let chunks = chunk_document(&doc, DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "doc-x-chunk-0");
        assert_eq!(chunks[0].text, "Trading Hours\n\nStocks trade nine to four.");
        assert_eq!(chunks[0].words(), "Stocks trade nine to four.");
    }

    #[test]
    fn chunk_count_is_ceiling_of_words_over_size() {
        for (words, size, expected) in [(0, 5, 0), (1, 5, 1), (5, 5, 1), (6, 5, 2), (11, 5, 3)] {
            let chunks = chunk_document(&doc_with_words(words), size);
            assert_eq!(chunks.len(), expected, "{words} words at size {size}");
            for (idx, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.chunk_index, idx);
                assert_eq!(chunk.chunk_id, format!("doc-x-chunk-{idx}"));
            }
        }
    }

    #[test]
    fn word_slices_reconstruct_body() {
        let doc = Document::new(
            "doc-r",
            "Spacing",
            "  alpha beta\n\tgamma   delta epsilon\nzeta eta ",
            "General",
        );
        let chunks = chunk_document(&doc, 3);
        assert_eq!(chunks.len(), 3);
        let rebuilt = chunks
            .iter()
            .map(|chunk| chunk.words())
            .collect::<Vec<_>>()
            .join(" ");
        let original: Vec<&str> = doc.body.split_whitespace().collect();
        assert_eq!(rebuilt, original.join(" "));
        assert!(chunks.iter().all(|c| c.text.starts_with("Spacing\n\n")));
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        let doc = Document::new("doc-e", "Empty", "   \n ", "General");
        assert!(chunk_document(&doc, 10).is_empty());
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let chunks = chunk_document(&doc_with_words(3), 0);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn builtin_chunk_ids_are_unique_and_stable() {
        let store = DocumentStore::builtin();
        let first: Vec<String> = store.chunks(40).into_iter().map(|c| c.chunk_id).collect();
        let second: Vec<String> = store.chunks(40).into_iter().map(|c| c.chunk_id).collect();
        assert_eq!(first, second);
        let unique: HashSet<&String> = first.iter().collect();
        assert_eq!(unique.len(), first.len());
        assert!(first.len() > store.len());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let docs = vec![
            Document::new("a", "A", "one", "General"),
            Document::new("a", "B", "two", "General"),
        ];
        assert!(DocumentStore::new(docs).is_err());
    }

    #[test]
    fn loads_corpus_from_json() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"[{{"id":"kb-1","title":"Hours","body":"Open daily.","category":"Ops"}}]"#
        )
        .expect("write corpus");
        let store = DocumentStore::from_json_file(file.path()).expect("load corpus");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("kb-1").map(|d| d.title.as_str()), Some("Hours"));
    }
}
