use crate::models::DocumentType;

/// Ordered rule table, most-specific first. The first rule with any keyword
/// hit wins, which keeps classification deterministic for identical input.
const RULES: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::CreditCard,
        &[
            "credit card statement",
            "credit card",
            "minimum payment due",
            "minimum payment",
            "credit limit",
            "card ending in",
        ],
    ),
    (
        DocumentType::BankStatement,
        &[
            "bank statement",
            "account summary",
            "statement period",
            "beginning balance",
            "checking account",
            "savings account",
            "statement",
            "bank",
        ],
    ),
    (
        DocumentType::Receipt,
        &[
            "receipt",
            "change due",
            "cash tendered",
            "thank you for your purchase",
        ],
    ),
    (
        DocumentType::Invoice,
        &["invoice", "amount due", "bill to", "remit to", "bill"],
    ),
];

/// Infer the document type from title and OCR content. Pure and
/// side-effect-free; identical input always yields the identical type.
pub fn classify(title: &str, content: &str) -> DocumentType {
    let title = title.to_lowercase();
    let content = content.to_lowercase();

    for (doc_type, keywords) in RULES {
        if keywords
            .iter()
            .any(|kw| title.contains(kw) || content.contains(kw))
        {
            return *doc_type;
        }
    }
    DocumentType::Unknown
}
