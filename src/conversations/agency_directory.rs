use std::collections::HashMap;

use super::types::Category;

type CountryTable = HashMap<Category, Vec<String>>;

/// Read-only `country -> category -> agencies` reference data. Agencies are
/// listed most relevant first.
#[derive(Debug, Clone, Default)]
pub struct AgencyDirectory {
    countries: HashMap<String, CountryTable>,
    aliases: HashMap<String, String>,
}

const VIETNAM: &[(Category, &[&str])] = &[
    (Category::Housing, &["Ministry of Construction", "Provincial Department of Construction"]),
    (
        Category::Land,
        &["Ministry of Natural Resources and Environment", "Provincial Department of Natural Resources and Environment"],
    ),
    (
        Category::Immigration,
        &["Immigration Department (Ministry of Public Security)", "Consular Department (Ministry of Foreign Affairs)"],
    ),
    (
        Category::Employment,
        &["Ministry of Labour, Invalids and Social Affairs", "Vietnam Social Security"],
    ),
    (Category::Transport, &["Ministry of Transport", "Directorate for Roads of Vietnam"]),
    (
        Category::Environment,
        &["Ministry of Natural Resources and Environment", "Vietnam Environment Administration"],
    ),
    (Category::Business, &["Ministry of Planning and Investment", "General Department of Taxation"]),
    (
        Category::Education,
        &["Ministry of Education and Training", "Provincial Department of Education and Training"],
    ),
];

const SINGAPORE: &[(Category, &[&str])] = &[
    (Category::Housing, &["Housing & Development Board (HDB)", "Urban Redevelopment Authority (URA)"]),
    (Category::Land, &["Singapore Land Authority (SLA)", "Urban Redevelopment Authority (URA)"]),
    (
        Category::Immigration,
        &["Immigration & Checkpoints Authority (ICA)", "Ministry of Manpower (MOM)"],
    ),
    (Category::Employment, &["Ministry of Manpower (MOM)", "Workforce Singapore (WSG)"]),
    (Category::Transport, &["Land Transport Authority (LTA)", "Ministry of Transport (MOT)"]),
    (Category::Environment, &["National Environment Agency (NEA)", "PUB, Singapore's National Water Agency"]),
    (
        Category::Business,
        &[
            "Accounting and Corporate Regulatory Authority (ACRA)",
            "Inland Revenue Authority of Singapore (IRAS)",
            "Enterprise Singapore",
        ],
    ),
    (Category::Education, &["Ministry of Education (MOE)", "SkillsFuture Singapore (SSG)"]),
];

const MALAYSIA: &[(Category, &[&str])] = &[
    (
        Category::Housing,
        &["Ministry of Local Government Development (KPKT)", "Perbadanan PR1MA Malaysia"],
    ),
    (
        Category::Land,
        &["Department of Director General of Lands and Mines (JKPTG)", "State Land and Mines Office (PTG)"],
    ),
    (Category::Immigration, &["Immigration Department of Malaysia", "Ministry of Home Affairs (KDN)"]),
    (
        Category::Employment,
        &["Ministry of Human Resources (KESUMA)", "Social Security Organisation (PERKESO)"],
    ),
    (Category::Transport, &["Road Transport Department (JPJ)", "Ministry of Transport Malaysia"]),
    (
        Category::Environment,
        &["Department of Environment (DOE)", "Ministry of Natural Resources and Environmental Sustainability"],
    ),
    (
        Category::Business,
        &["Companies Commission of Malaysia (SSM)", "Inland Revenue Board of Malaysia (LHDN)"],
    ),
    (Category::Education, &["Ministry of Education Malaysia", "Ministry of Higher Education"]),
];

impl AgencyDirectory {
    /// Vietnam, Singapore and Malaysia across every category.
    pub fn builtin() -> Self {
        let mut directory = Self::default();
        directory.insert_country("vietnam", VIETNAM, &["viet nam", "việt nam", "vn", "vnm"]);
        directory.insert_country("singapore", SINGAPORE, &["sg", "sgp"]);
        directory.insert_country("malaysia", MALAYSIA, &["my", "mys"]);
        directory
    }

    fn insert_country(&mut self, country: &str, rows: &[(Category, &[&str])], aliases: &[&str]) {
        let table = rows
            .iter()
            .map(|(category, agencies)| (*category, agencies.iter().map(|a| a.to_string()).collect()))
            .collect();
        self.countries.insert(country.to_string(), table);
        for alias in aliases {
            self.aliases.insert(alias.to_string(), country.to_string());
        }
    }

    fn resolve(&self, country: &str) -> Option<&CountryTable> {
        let key = country.trim().to_lowercase();
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.countries.get(&key)
    }

    /// Agencies for `(country, category)`; empty when either is unknown.
    pub fn lookup(&self, country: &str, category: Category) -> &[String] {
        self.resolve(country)
            .and_then(|table| table.get(&category))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
