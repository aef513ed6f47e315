// src/family.rs

/// The two indices published by the source site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricFamily {
    /// ICC: Índice de Confiança do Consumidor
    ConsumerConfidence,
    /// ICF: Intenção de Consumo das Famílias
    IntentToBuy,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 2] = [MetricFamily::ConsumerConfidence, MetricFamily::IntentToBuy];

    pub fn as_str(&self) -> &str {
        match self {
            MetricFamily::ConsumerConfidence => "consumer-confidence",
            MetricFamily::IntentToBuy => "consumer-intent-to-buy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "consumer-confidence" | "icc" => Some(MetricFamily::ConsumerConfidence),
            "consumer-intent-to-buy" | "icf" => Some(MetricFamily::IntentToBuy),
            _ => None,
        }
    }

    /// Short code used in file and table names.
    pub fn code(&self) -> &'static str {
        match self {
            MetricFamily::ConsumerConfidence => "icc",
            MetricFamily::IntentToBuy => "icf",
        }
    }

    /// Text that identifies the main metric row in the first column.
    /// Matched case- and accent-insensitively.
    pub fn label_marker(&self) -> &'static str {
        match self {
            MetricFamily::ConsumerConfidence => "Índice de Confiança do Consumidor",
            MetricFamily::IntentToBuy => "ICF",
        }
    }

    /// Page that carries the `a.download` link for the spreadsheet.
    pub fn source_url(&self) -> &'static str {
        match self {
            MetricFamily::ConsumerConfidence => "https://www.fecomercio.com.br/pesquisas/indice/icc",
            MetricFamily::IntentToBuy => "https://www.fecomercio.com.br/pesquisas/indice/icf",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.xlsx", self.code())
    }

    pub fn raw_table(&self) -> String {
        format!("{}_raw", self.code())
    }
}

impl std::fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_accepts_codes_and_names() {
        assert_eq!(
            MetricFamily::from_str(" ICC "),
            Some(MetricFamily::ConsumerConfidence)
        );
        assert_eq!(
            MetricFamily::from_str("consumer-intent-to-buy"),
            Some(MetricFamily::IntentToBuy)
        );
        assert_eq!(MetricFamily::from_str("ipca"), None);
    }

    #[test]
    fn test_names_derive_from_code() {
        let f = MetricFamily::IntentToBuy;
        assert_eq!(f.file_name(), "icf.xlsx");
        assert_eq!(f.raw_table(), "icf_raw");
        assert_eq!(MetricFamily::from_str(f.as_str()), Some(f));
    }
}
