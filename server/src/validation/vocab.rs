//! Fixed vocabularies accepted by the enrollment form and the API.

pub const LOINC_SYSTEM: &str = "http://loinc.org";
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
pub const CVX_SYSTEM: &str = "http://hl7.org/fhir/sid/cvx";

pub const US_STATES: &[&str] = &[
    "Alabama",
    "Alaska",
    "American Samoa",
    "Arizona",
    "Arkansas",
    "California",
    "Colorado",
    "Connecticut",
    "Delaware",
    "District of Columbia",
    "Federated States of Micronesia",
    "Florida",
    "Georgia",
    "Guam",
    "Hawaii",
    "Idaho",
    "Illinois",
    "Indiana",
    "Iowa",
    "Kansas",
    "Kentucky",
    "Louisiana",
    "Maine",
    "Marshall Islands",
    "Maryland",
    "Massachusetts",
    "Michigan",
    "Minnesota",
    "Mississippi",
    "Missouri",
    "Montana",
    "Nebraska",
    "Nevada",
    "New Hampshire",
    "New Jersey",
    "New Mexico",
    "New York",
    "North Carolina",
    "North Dakota",
    "Northern Mariana Islands",
    "Ohio",
    "Oklahoma",
    "Oregon",
    "Palau",
    "Pennsylvania",
    "Puerto Rico",
    "Rhode Island",
    "South Carolina",
    "South Dakota",
    "Tennessee",
    "Texas",
    "United States Minor Outlying Islands",
    "Utah",
    "Vermont",
    "Virgin Islands",
    "Virginia",
    "Washington",
    "West Virginia",
    "Wisconsin",
    "Wyoming",
];

pub const CONTACT_METHOD_EMAIL: &str = "E-mailed Web Link";
pub const CONTACT_METHOD_SMS_LINK: &str = "SMS Texted Weblink";
pub const CONTACT_METHOD_PHONE: &str = "Telephone call";
pub const CONTACT_METHOD_SMS: &str = "SMS Text-message";

pub const CONTACT_METHODS: &[&str] = &[
    CONTACT_METHOD_EMAIL,
    CONTACT_METHOD_SMS_LINK,
    CONTACT_METHOD_PHONE,
    CONTACT_METHOD_SMS,
    "Opt-out",
    "Unknown",
];

pub const CONTACT_TIMES: &[&str] = &["Morning", "Afternoon", "Evening"];

pub const MONITORING_PLANS: &[&str] = &[
    "None",
    "Daily active monitoring",
    "Self-monitoring with public health supervision",
    "Self-monitoring with delegated supervision",
    "Self-observation",
];

/// LOINC code → lab type
pub const LAB_TYPES: &[(&str, &str)] = &[
    ("94500-6", "PCR"),
    ("94558-4", "Antigen"),
    ("94762-2", "Antibody (total)"),
    ("94563-4", "Antibody (IgG)"),
    ("94564-2", "Antibody (IgM)"),
    ("94562-6", "Antibody (IgA)"),
];

/// SNOMED code → lab result
pub const LAB_RESULTS: &[(&str, &str)] = &[
    ("10828004", "positive"),
    ("260385009", "negative"),
    ("82334004", "indeterminate"),
    ("74964007", "other"),
];

pub struct VaccineProduct {
    pub cvx: &'static str,
    pub group: &'static str,
    pub product: &'static str,
}

pub const VACCINES: &[VaccineProduct] = &[
    VaccineProduct {
        cvx: "207",
        group: "COVID-19",
        product: "Moderna COVID-19 Vaccine",
    },
    VaccineProduct {
        cvx: "208",
        group: "COVID-19",
        product: "Pfizer-BioNTech COVID-19 Vaccine",
    },
    VaccineProduct {
        cvx: "212",
        group: "COVID-19",
        product: "Janssen (J&J) COVID-19 Vaccine",
    },
    VaccineProduct {
        cvx: "213",
        group: "COVID-19",
        product: "Unknown COVID-19 Vaccine",
    },
];

pub const DOSE_NUMBERS: &[&str] = &["1", "2", "Unknown"];

pub fn lookup<'a>(table: &'a [(&'a str, &'a str)], code: &str) -> Option<&'a str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

pub fn reverse_lookup<'a>(table: &'a [(&'a str, &'a str)], name: &str) -> Option<&'a str> {
    table.iter().find(|(_, n)| *n == name).map(|(code, _)| *code)
}

pub fn vaccine_by_cvx(cvx: &str) -> Option<&'static VaccineProduct> {
    VACCINES.iter().find(|v| v.cvx == cvx)
}

pub fn vaccine_by_product(product: &str) -> Option<&'static VaccineProduct> {
    VACCINES.iter().find(|v| v.product == product)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_directions() {
        assert_eq!(lookup(LAB_TYPES, "94500-6"), Some("PCR"));
        assert_eq!(reverse_lookup(LAB_TYPES, "PCR"), Some("94500-6"));
        assert_eq!(lookup(LAB_RESULTS, "0000"), None);
    }

    #[test]
    fn test_vaccine_lookup() {
        let product = vaccine_by_cvx("208").unwrap();
        assert_eq!(product.group, "COVID-19");
        assert_eq!(vaccine_by_product(product.product).unwrap().cvx, "208");
    }
}
