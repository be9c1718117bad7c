//! Transaction records and the CSV line splitter that produces them.
//!
//! The splitter understands double-quote grouping so that commas inside a
//! quoted field do not end the field. It does not understand `""` escapes
//! or quoted fields spanning several lines.

/// Number of positional fields in a transaction line.
pub const FIELD_COUNT: usize = 8;

/// Prefix of the header line, skipped when it is the first line of a file.
pub const HEADER_PREFIX: &str = "InvoiceNo";

/// One parsed transaction line.
///
/// All fields are kept as trimmed text; numeric interpretation happens in
/// the mapper so that every parse failure can be classified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: String,
    pub quantity: String,
    pub invoice_date: String,
    pub unit_price: String,
    pub customer_id: String,
    pub country: String,
}

impl Record {
    /// Splits `line` and builds a record from its first eight fields, each
    /// trimmed of surrounding ASCII whitespace.
    ///
    /// Returns the number of fields found when there are fewer than eight.
    pub fn parse(line: &str) -> Result<Record, usize> {
        let fields = split_fields(line);
        if fields.len() < FIELD_COUNT {
            return Err(fields.len());
        }

        let mut fields = fields.into_iter().map(|f| trim_ascii(&f).to_owned());
        // Arity checked above.
        let mut next = || fields.next().unwrap_or_default();
        Ok(Record {
            invoice_no: next(),
            stock_code: next(),
            description: next(),
            quantity: next(),
            invoice_date: next(),
            unit_price: next(),
            customer_id: next(),
            country: next(),
        })
    }

    /// Whether the invoice number marks a cancellation (`C`/`c` prefix).
    pub fn is_cancellation(&self) -> bool {
        self.invoice_no.starts_with(['C', 'c'])
    }
}

/// Splits one line (without its terminator) into fields.
///
/// A `"` toggles quoting and is dropped from the output; a `,` outside
/// quotes ends the current field. Never fails: an empty line yields one
/// empty field, and trailing empty fields are kept.
pub fn split_fields(line: &str) -> Vec<String> {
    if !line.contains('"') {
        return line.split(',').map(str::to_owned).collect();
    }

    let mut fields = Vec::with_capacity(FIELD_COUNT);
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}

fn trim_ascii(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_line_keeps_trailing_empty_fields() {
        assert_eq!(split_fields("a,,b,"), vec!["a", "", "b", ""]);
        assert_eq!(split_fields("a,b,c,,,,,").len(), 8);
    }

    #[test]
    fn empty_line_is_one_empty_field() {
        assert_eq!(split_fields(""), vec![""]);
    }

    #[test]
    fn quoted_comma_stays_in_field() {
        assert_eq!(split_fields("\"a,b\",c"), vec!["a,b", "c"]);
        assert_eq!(
            split_fields("536365,X,\"A, big jar\",2,D,5.00,17850,Germany"),
            vec!["536365", "X", "A, big jar", "2", "D", "5.00", "17850", "Germany"]
        );
    }

    #[test]
    fn doubled_quotes_are_not_escapes() {
        // Each quote toggles; nothing is emitted for them.
        assert_eq!(split_fields("\"say \"\"hi\"\"\",x"), vec!["say hi", "x"]);
    }

    #[test]
    fn unterminated_quote_swallows_rest_of_line() {
        assert_eq!(split_fields("a,\"b,c,d"), vec!["a", "b,c,d"]);
    }

    #[test]
    fn parse_trims_every_field() {
        let record = Record::parse(" 536365 ,X, Y , 6 ,D, 2.55 ,17850,  United Kingdom ").unwrap();
        assert_eq!(record.invoice_no, "536365");
        assert_eq!(record.quantity, "6");
        assert_eq!(record.unit_price, "2.55");
        assert_eq!(record.country, "United Kingdom");
    }

    #[test]
    fn parse_ignores_extra_fields() {
        let record = Record::parse("1,2,3,4,5,6,7,8,9,10").unwrap();
        assert_eq!(record.country, "8");
    }

    #[test]
    fn parse_reports_short_arity() {
        assert_eq!(Record::parse("536365,X,Y"), Err(3));
        assert_eq!(Record::parse(""), Err(1));
    }

    #[test]
    fn cancellation_prefix_is_ascii_c_only() {
        let mut record = Record::parse("C1,x,x,1,x,1,x,x").unwrap();
        assert!(record.is_cancellation());
        record.invoice_no = "c1".into();
        assert!(record.is_cancellation());
        record.invoice_no = "Ç1".into();
        assert!(!record.is_cancellation());
        record.invoice_no = "1C".into();
        assert!(!record.is_cancellation());
    }
}
