//! Prompt templates for structured extraction.
//!
//! Each [`crate::DocumentType`] maps to a [`PromptTemplate`] pairing a system
//! prompt (extraction rules, layout hints) with a user template that embeds
//! the document text and the required JSON shape. Unknown documents fall back
//! to a generic key-information prompt.

use crate::classify::DocumentType;

/// A system prompt plus a user template with a `{text}` placeholder.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub system: &'static str,
    user_template: &'static str,
}

impl PromptTemplate {
    /// Render the user prompt with the document text substituted in.
    pub fn render(&self, text: &str) -> String {
        self.user_template.replace("{text}", text)
    }
}

const INVOICE_SYSTEM: &str = r#"You are an expert invoice data extraction AI with 99.9% accuracy. Your job is to extract structured data from invoice documents of ANY format or template.

CRITICAL EXTRACTION RULES:
1. Return ONLY valid JSON - absolutely no explanations, markdown, or extra text
2. Use null for any field NOT found in the document
3. NEVER invent, guess, or hallucinate data - extract only what exists
4. Read numbers with extreme precision - quantity, unit price, and line amounts are DIFFERENT values
5. Distinguish between identifiers carefully:
   - Invoice Number/ID: Usually labeled "Invoice #", "Invoice No.", "Invoice ID", "INV-"
   - Order ID/PO Number: Usually labeled "Order #", "PO #", "Reference", "Customer PO"
   - These are NOT the same thing!

CURRENCY DETECTION - EXTREMELY IMPORTANT:
- Look for explicit "Currency:" field in the document - this is the DEFINITIVE currency
- Look for currency labels like "PKR", "USD", "EUR", "GBP", "INR" near amounts
- Check column headers: "Amount (PKR)", "Unit Price (PKR)", "Price (USD)" etc.
- If the document says "Currency: PKR", ALL amounts are in PKR - do NOT use $ symbol
- Return the 3-letter currency CODE (PKR, USD, EUR, etc.) in the "currency" field
- For line items, extract ONLY the numeric values without any currency symbols

COMMON INVOICE LAYOUTS TO RECOGNIZE:
1. Traditional: Header with vendor info, bill-to, invoice details, line items table, totals
2. Modern/Minimal: Clean design, sparse labels, amounts may be right-aligned
3. International: May have multiple currencies, VAT numbers, different date formats
4. E-commerce: Order IDs prominent, shipping info, tracking numbers
5. Service invoices: Time-based billing, hourly rates, project descriptions
6. Itemized retail: SKUs, barcodes, discounts per line

FIELD EXTRACTION GUIDELINES:
- vendor_name: The company/person ISSUING the invoice (seller), NOT the customer
- bill_to/customer: The party being CHARGED (buyer)
- invoice_number: The unique identifier for THIS invoice document
- Dates: Convert to YYYY-MM-DD format when possible
- Amounts: Extract as NUMBERS only, without currency symbols
- Line items: Each row in the items table with description, quantity, rate, amount"#;

const INVOICE_USER: &str = r#"Extract ALL invoice data from the document below. Be thorough and precise.

REQUIRED JSON STRUCTURE:
{
  "vendor_name": "Company issuing the invoice (seller name from header/logo)",
  "vendor_address": "Seller's full address if shown",
  "vendor_email": "Seller's email if shown",
  "vendor_phone": "Seller's phone if shown",
  "invoice_number": "The INVOICE number (NOT order/PO number)",
  "invoice_date": "Date in YYYY-MM-DD format",
  "due_date": "Payment due date in YYYY-MM-DD format",
  "order_id": "Order/PO/Reference number if different from invoice number",
  "bill_to": "Customer name and address being billed",
  "ship_to": "Shipping address if different from bill_to",
  "currency": "Currency code (USD, EUR, GBP, INR, etc.)",
  "line_items": [
    {
      "description": "Item/service description",
      "quantity": 1,
      "unit_price": 10.00,
      "amount": 10.00,
      "sku": "Product code if shown",
      "discount": 0.00
    }
  ],
  "subtotal": "Sum of line items before tax/shipping",
  "tax_amount": "Tax/VAT/GST amount",
  "tax_rate": "Tax percentage if shown (e.g., '8.25%' or 8.25)",
  "shipping_amount": "Shipping/delivery charge",
  "discount_amount": "Total discount if any",
  "total_amount": "Final amount due (the biggest/bottom total)",
  "amount_paid": "Amount already paid if shown",
  "balance_due": "Remaining balance if shown",
  "payment_terms": "Payment terms (Net 30, Due on Receipt, etc.)",
  "payment_method": "Accepted payment methods if listed",
  "notes": "Any additional notes, terms, or messages"
}

LINE ITEM EXTRACTION - READ CAREFULLY:
- "Qty" or "Quantity" column = quantity (usually small: 1, 2, 3, 5, 10)
- "Rate", "Unit Price", "Price Each" column = unit_price (price for ONE item)
- "Amount", "Total", "Line Total" column = amount (quantity × unit_price)

EXAMPLE: A row showing "Widget | 3 | $18.90 | $56.70"
Means: quantity=3, unit_price=18.90, amount=56.70

AMOUNT VALIDATION:
- Line amount should ≈ quantity × unit_price
- Subtotal should ≈ sum of all line amounts
- Total should ≈ subtotal + tax + shipping - discounts

DOCUMENT TEXT TO EXTRACT FROM:
{text}

Return ONLY the JSON object with extracted data:"#;

const RESUME_SYSTEM: &str = r#"You are an expert HR/recruitment AI with 99.9% accuracy in resume parsing. Your job is to extract structured data from resumes/CVs of ANY format or template.

CRITICAL EXTRACTION RULES:
1. Return ONLY valid JSON - absolutely no explanations, markdown, or extra text
2. Use null for any field NOT found in the document
3. NEVER invent, guess, or hallucinate data - extract only what exists
4. Clean up OCR artifacts and formatting issues in text
5. Infer total experience from job dates when not explicitly stated

EXPERIENCE EXTRACTION - EXTREMELY IMPORTANT:
- Extract ALL work experience entries, starting from MOST RECENT
- For each job, capture: company, role/title, duration, key responsibilities
- Calculate duration_months from date ranges (e.g., "Jan 2022 - Dec 2023" = 24 months)
- "Present" or "Current" means the job is ongoing (is_current: true)
- Clean bullet points - combine broken lines, remove special characters

SKILLS EXTRACTION:
- Capture ALL skills mentioned anywhere in the resume
- Include technical skills (programming languages, tools, frameworks)
- Include soft skills (leadership, communication, teamwork)
- Don't duplicate - each skill should appear once
- Keep original casing (Python, not PYTHON or python)

EDUCATION EXTRACTION:
- Extract degree type (Bachelor's, Master's, PhD, etc.)
- Extract field of study / major
- Extract institution name
- Extract graduation year
- Extract GPA if mentioned (normalize to 4.0 scale if needed)

COMMON RESUME LAYOUTS TO RECOGNIZE:
1. Chronological: Experience listed newest-to-oldest
2. Functional: Skills-focused, less emphasis on timeline
3. Combination: Both skills and chronological experience
4. Academic CV: Publications, research, teaching emphasis
5. Modern/Creative: Non-traditional layouts, portfolios
6. ATS-Optimized: Keyword-heavy, simple formatting"#;

const RESUME_USER: &str = r#"Extract ALL resume data from the document below. Be thorough and precise.

REQUIRED JSON STRUCTURE:
{
  "candidate_name": "Full name of the candidate",
  "email": "Email address",
  "phone": "Phone number with country code if present",
  "location": "City, State/Country",
  "linkedin_url": "LinkedIn profile URL",
  "github_url": "GitHub profile URL if present",
  "portfolio_url": "Portfolio or personal website if present",
  "current_role": "Current or most recent job title",
  "current_company": "Current or most recent employer",
  "summary": "Professional summary or objective (first 500 chars)",
  "total_experience_years": 5.5,
  "skills": ["Python", "JavaScript", "AWS", "Docker"],
  "technical_skills": ["Python", "AWS", "Docker", "SQL"],
  "soft_skills": ["Leadership", "Communication"],
  "experience": [
    {
      "company": "Company Name",
      "role": "Job Title",
      "duration": "Jan 2022 - Present",
      "duration_months": 24,
      "start_date": "2022-01",
      "end_date": "Present",
      "location": "City, Country",
      "is_current": true,
      "highlights": [
        "Led team of 5 engineers",
        "Increased revenue by 30%"
      ]
    }
  ],
  "education": [
    {
      "institution": "University Name",
      "degree": "Bachelor of Science",
      "field_of_study": "Computer Science",
      "year": "2018",
      "start_year": 2014,
      "end_year": 2018,
      "gpa": 3.8,
      "honors": "Magna Cum Laude",
      "location": "City, Country"
    }
  ],
  "certifications": ["AWS Solutions Architect", "PMP"],
  "languages": ["English: Native", "Spanish: Professional"],
  "projects": [
    {
      "name": "Project Name",
      "description": "Brief description",
      "technologies": ["React", "Node.js"],
      "url": "https://github.com/..."
    }
  ],
  "awards": ["Employee of the Year 2022"],
  "publications": [],
  "interests": ["Open Source", "Machine Learning"]
}

EXPERIENCE DURATION CALCULATION:
- "Jan 2022 - Present" with today being Jan 2026 = 48 months
- "2020 - 2022" = approximately 24 months
- If only years given, assume Jan to Dec

TOTAL EXPERIENCE CALCULATION:
- Sum all duration_months from experience entries
- Convert to years (divide by 12)
- Account for overlapping jobs (don't double count)

SKILLS GUIDELINES:
- Extract from dedicated "Skills" section
- Also extract from job descriptions (technologies used)
- Keep as individual items, not comma-separated strings

RESUME TEXT TO EXTRACT FROM:
{text}

Return ONLY the JSON object with extracted data:"#;

const GENERIC_SYSTEM: &str = r#"You are a document extraction AI. Extract key information from the provided text.

RULES:
1. Return ONLY valid JSON
2. Use null for fields you cannot determine
3. Do NOT invent information"#;

const GENERIC_USER: &str = r#"Analyze this document and extract key information.

Return a JSON object with these fields:
- document_type (string): Your best guess of document type
- title (string): Document title if present
- date (string): Any date found, in YYYY-MM-DD format
- key_entities (array): Important names, companies, or organizations
- key_values (object): Important numeric values with labels
- summary (string): Brief 1-2 sentence summary

DOCUMENT TEXT:
{text}

JSON:"#;

pub const INVOICE_PROMPT: PromptTemplate = PromptTemplate {
    system: INVOICE_SYSTEM,
    user_template: INVOICE_USER,
};

pub const RESUME_PROMPT: PromptTemplate = PromptTemplate {
    system: RESUME_SYSTEM,
    user_template: RESUME_USER,
};

pub const GENERIC_PROMPT: PromptTemplate = PromptTemplate {
    system: GENERIC_SYSTEM,
    user_template: GENERIC_USER,
};

/// Template for a document type; `Unknown` gets the generic fallback.
pub fn prompt_for(doc_type: DocumentType) -> PromptTemplate {
    match doc_type {
        DocumentType::Invoice => INVOICE_PROMPT,
        DocumentType::Resume => RESUME_PROMPT,
        DocumentType::Unknown => GENERIC_PROMPT,
    }
}

/// Build `(system, user)` prompts for one extraction, truncating the text to
/// `max_text_length` characters with an explicit marker so the model knows
/// the document was cut.
pub fn format_extraction_prompt(
    doc_type: DocumentType,
    text: &str,
    max_text_length: usize,
) -> (String, String) {
    let template = prompt_for(doc_type);
    let user = if text.chars().count() > max_text_length {
        let truncated: String = text.chars().take(max_text_length).collect();
        template.render(&format!("{truncated}\n\n[Text truncated...]"))
    } else {
        template.render(text)
    };
    (template.system.to_string(), user)
}
