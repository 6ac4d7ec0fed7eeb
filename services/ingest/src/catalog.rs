//! Pipeline catalog
//!
//! Declarative description of every dimension and dataset pipeline: CSV
//! locations, column renames, code columns to strip, hash columns, persisted
//! columns, natural keys. The whole star schema derives from this module:
//! the DDL is generated from it, the reference loaders read it, and the fact
//! loaders derive foreign keys THROUGH the dimension declarations, so the
//! two sides can never disagree on hash columns or normalization.

/// Pre-hash formatting applied to business-code values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    None,
    Uppercase,
}

impl Format {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Format::None => value.to_string(),
            Format::Uppercase => value.to_uppercase(),
        }
    }
}

// =============================================================================
// Dimension (reference) pipelines
// =============================================================================

#[derive(Debug)]
pub struct ReferenceSpec {
    /// Table name and pipeline name.
    pub name: &'static str,
    /// CSV path relative to the data directory.
    pub csv: &'static str,
    /// {CSV header -> column} renames.
    pub renames: &'static [(&'static str, &'static str)],
    /// Code columns stripped of surrounding whitespace/quotes.
    pub strip: &'static [&'static str],
    /// Primary business-key column; rows where it is null are dropped.
    pub business_key: &'static str,
    /// Fingerprint input columns, in order.
    pub hash_columns: &'static [&'static str],
    /// Persisted payload columns (all text), excluding id/source_dataset.
    pub columns: &'static [&'static str],
    /// Flags are globally shared and carry no source_dataset column.
    pub has_source_dataset: bool,
    /// Pre-hash formatting of business codes.
    pub format: Format,
}

impl ReferenceSpec {
    /// CREATE TABLE + unique index for this dimension.
    pub fn ddl(&self) -> String {
        let mut cols = vec!["    id bigint PRIMARY KEY".to_string()];
        for c in self.columns {
            if *c == self.business_key {
                cols.push(format!("    {} text NOT NULL", c));
            } else {
                cols.push(format!("    {} text", c));
            }
        }
        if self.has_source_dataset {
            cols.push("    source_dataset text NOT NULL".to_string());
        }
        cols.push("    created_at timestamptz NOT NULL DEFAULT now()".to_string());
        cols.push("    updated_at timestamptz NOT NULL DEFAULT now()".to_string());

        let unique = if self.has_source_dataset {
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {t}_business_uq ON {t} ({k}, source_dataset)",
                t = self.name,
                k = self.business_key
            )
        } else {
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {t}_business_uq ON {t} ({k})",
                t = self.name,
                k = self.business_key
            )
        };

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n{};",
            self.name,
            cols.join(",\n"),
            unique
        )
    }

    /// Columns of the INSERT, in order.
    pub fn insert_columns(&self) -> Vec<&'static str> {
        let mut cols = vec!["id"];
        cols.extend_from_slice(self.columns);
        if self.has_source_dataset {
            cols.push("source_dataset");
        }
        cols
    }
}

pub static REFERENCES: &[ReferenceSpec] = &[
    ReferenceSpec {
        name: "area_codes",
        csv: "references/area_codes.csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area", "area"),
            ("Area Code (M49)", "area_code_m49"),
        ],
        strip: &["area_code", "area_code_m49"],
        business_key: "area_code",
        hash_columns: &["area_code", "source_dataset"],
        columns: &["area_code", "area", "area_code_m49"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "item_codes",
        csv: "references/item_codes.csv",
        renames: &[
            ("Item Code", "item_code"),
            ("Item", "item"),
            ("Item Code (CPC)", "item_code_cpc"),
            ("Item Code (FBS)", "item_code_fbs"),
            ("Item Code (SDG)", "item_code_sdg"),
        ],
        strip: &["item_code", "item_code_cpc", "item_code_fbs", "item_code_sdg"],
        business_key: "item_code",
        hash_columns: &["item_code", "source_dataset"],
        columns: &["item_code", "item", "item_code_cpc", "item_code_fbs", "item_code_sdg"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "elements",
        csv: "references/elements.csv",
        renames: &[("Element Code", "element_code"), ("Element", "element")],
        strip: &["element_code"],
        business_key: "element_code",
        hash_columns: &["element_code", "source_dataset"],
        columns: &["element_code", "element"],
        has_source_dataset: true,
        format: Format::None,
    },
    // Flags are the documented exception: hashed by flag alone, shared by
    // every dataset.
    ReferenceSpec {
        name: "flags",
        csv: "references/flags.csv",
        renames: &[("Flag", "flag"), ("Description", "description")],
        strip: &["flag"],
        business_key: "flag",
        hash_columns: &["flag"],
        columns: &["flag", "description"],
        has_source_dataset: false,
        format: Format::Uppercase,
    },
    ReferenceSpec {
        name: "currencies",
        csv: "references/currencies.csv",
        renames: &[("ISO Currency Code", "iso_currency_code"), ("Currency", "currency")],
        strip: &["iso_currency_code"],
        business_key: "iso_currency_code",
        hash_columns: &["iso_currency_code", "source_dataset"],
        columns: &["iso_currency_code", "currency"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "sources",
        csv: "references/sources.csv",
        renames: &[("Source Code", "source_code"), ("Source", "source")],
        strip: &["source_code"],
        business_key: "source_code",
        hash_columns: &["source_code", "source_dataset"],
        columns: &["source_code", "source"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "releases",
        csv: "references/releases.csv",
        renames: &[("Release Code", "release_code"), ("Release", "release")],
        strip: &["release_code"],
        business_key: "release_code",
        hash_columns: &["release_code", "source_dataset"],
        columns: &["release_code", "release"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "sexs",
        csv: "references/sexs.csv",
        renames: &[("Sex Code", "sex_code"), ("Sex", "sex")],
        strip: &["sex_code"],
        business_key: "sex_code",
        hash_columns: &["sex_code", "source_dataset"],
        columns: &["sex_code", "sex"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "indicators",
        csv: "references/indicators.csv",
        renames: &[("Indicator Code", "indicator_code"), ("Indicator", "indicator")],
        strip: &["indicator_code"],
        business_key: "indicator_code",
        hash_columns: &["indicator_code", "source_dataset"],
        columns: &["indicator_code", "indicator"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "surveys",
        csv: "references/surveys.csv",
        renames: &[("Survey Code", "survey_code"), ("Survey", "survey")],
        strip: &["survey_code"],
        business_key: "survey_code",
        hash_columns: &["survey_code", "source_dataset"],
        columns: &["survey_code", "survey"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "purposes",
        csv: "references/purposes.csv",
        renames: &[("Purpose Code", "purpose_code"), ("Purpose", "purpose")],
        strip: &["purpose_code"],
        business_key: "purpose_code",
        hash_columns: &["purpose_code", "source_dataset"],
        columns: &["purpose_code", "purpose"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "donors",
        csv: "references/donors.csv",
        renames: &[
            ("Donor Code", "donor_code"),
            ("Donor", "donor"),
            ("Donor Code (M49)", "donor_code_m49"),
        ],
        strip: &["donor_code", "donor_code_m49"],
        business_key: "donor_code",
        hash_columns: &["donor_code", "source_dataset"],
        columns: &["donor_code", "donor", "donor_code_m49"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "food_groups",
        csv: "references/food_groups.csv",
        renames: &[("Food Group Code", "food_group_code"), ("Food Group", "food_group")],
        strip: &["food_group_code"],
        business_key: "food_group_code",
        hash_columns: &["food_group_code", "source_dataset"],
        columns: &["food_group_code", "food_group"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "geographic_levels",
        csv: "references/geographic_levels.csv",
        renames: &[
            ("Geographic Level Code", "geographic_level_code"),
            ("Geographic Level", "geographic_level"),
        ],
        strip: &["geographic_level_code"],
        business_key: "geographic_level_code",
        hash_columns: &["geographic_level_code", "source_dataset"],
        columns: &["geographic_level_code", "geographic_level"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "factors",
        csv: "references/factors.csv",
        renames: &[("Factor Code", "factor_code"), ("Factor", "factor")],
        strip: &["factor_code"],
        business_key: "factor_code",
        hash_columns: &["factor_code", "source_dataset"],
        columns: &["factor_code", "factor"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "industries",
        csv: "references/industries.csv",
        renames: &[("Industry Code", "industry_code"), ("Industry", "industry")],
        strip: &["industry_code"],
        business_key: "industry_code",
        hash_columns: &["industry_code", "source_dataset"],
        columns: &["industry_code", "industry"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "food_values",
        csv: "references/food_values.csv",
        renames: &[("Food Value Code", "food_value_code"), ("Food Value", "food_value")],
        strip: &["food_value_code"],
        business_key: "food_value_code",
        hash_columns: &["food_value_code", "source_dataset"],
        columns: &["food_value_code", "food_value"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "population_age_groups",
        csv: "references/population_age_groups.csv",
        renames: &[
            ("Population Age Group Code", "population_age_group_code"),
            ("Population Age Group", "population_age_group"),
        ],
        strip: &["population_age_group_code"],
        business_key: "population_age_group_code",
        hash_columns: &["population_age_group_code", "source_dataset"],
        columns: &["population_age_group_code", "population_age_group"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "reporter_country_codes",
        csv: "references/reporter_country_codes.csv",
        renames: &[
            ("Reporter Country Code", "reporter_country_code"),
            ("Reporter Countries", "reporter_countries"),
            ("Reporter Country Code (M49)", "reporter_country_code_m49"),
        ],
        strip: &["reporter_country_code", "reporter_country_code_m49"],
        business_key: "reporter_country_code",
        hash_columns: &["reporter_country_code", "source_dataset"],
        columns: &["reporter_country_code", "reporter_countries", "reporter_country_code_m49"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "partner_country_codes",
        csv: "references/partner_country_codes.csv",
        renames: &[
            ("Partner Country Code", "partner_country_code"),
            ("Partner Countries", "partner_countries"),
            ("Partner Country Code (M49)", "partner_country_code_m49"),
        ],
        strip: &["partner_country_code", "partner_country_code_m49"],
        business_key: "partner_country_code",
        hash_columns: &["partner_country_code", "source_dataset"],
        columns: &["partner_country_code", "partner_countries", "partner_country_code_m49"],
        has_source_dataset: true,
        format: Format::None,
    },
    ReferenceSpec {
        name: "recipient_country_codes",
        csv: "references/recipient_country_codes.csv",
        renames: &[
            ("Recipient Country Code", "recipient_country_code"),
            ("Recipient Country", "recipient_country"),
            ("Recipient Country Code (M49)", "recipient_country_code_m49"),
        ],
        strip: &["recipient_country_code", "recipient_country_code_m49"],
        business_key: "recipient_country_code",
        hash_columns: &["recipient_country_code", "source_dataset"],
        columns: &["recipient_country_code", "recipient_country", "recipient_country_code_m49"],
        has_source_dataset: true,
        format: Format::None,
    },
];

pub fn dimension(name: &str) -> Option<&'static ReferenceSpec> {
    REFERENCES.iter().find(|r| r.name == name)
}

// =============================================================================
// Dataset (fact) pipelines
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColType {
    BigInt,
    Int,
    Float,
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct FactColumn {
    pub name: &'static str,
    pub ty: ColType,
}

const fn col(name: &'static str, ty: ColType) -> FactColumn {
    FactColumn { name, ty }
}

/// A foreign-key derivation. The hash columns, normalization and formatting
/// all come from the referenced dimension's declaration; only the target
/// column name lives here.
#[derive(Debug, Clone, Copy)]
pub struct FkSpec {
    /// Dimension table this key points into.
    pub dimension: &'static str,
    /// Column the derived id is stored in.
    pub target: &'static str,
}

const fn fk(dimension: &'static str, target: &'static str) -> FkSpec {
    FkSpec { dimension, target }
}

#[derive(Debug)]
pub struct FactSpec {
    /// Table name, pipeline name, and the source_dataset hash value.
    pub name: &'static str,
    /// CSV path relative to the data directory.
    pub csv: &'static str,
    pub renames: &'static [(&'static str, &'static str)],
    pub strip: &'static [&'static str],
    pub fks: &'static [FkSpec],
    /// Descriptive columns dropped after FK derivation (their content lives
    /// in the dimension tables).
    pub exclude: &'static [&'static str],
    /// Measurement columns persisted after the FK columns.
    pub measurements: &'static [FactColumn],
    /// Natural-key columns backing the uniqueness index.
    pub natural_key: &'static [&'static str],
}

/// Ledger-chunk base size in rows.
pub const BASE_CHUNK_ROWS: usize = 20_000;
/// Bound-parameter budget per INSERT, under Postgres's 65 535 bind limit.
pub const CHUNK_PARAM_BUDGET: usize = 65_000;

impl FactSpec {
    /// All persisted columns in insert order: FK ids first, then
    /// measurements.
    pub fn columns(&self) -> Vec<FactColumn> {
        let mut cols: Vec<FactColumn> = self
            .fks
            .iter()
            .map(|f| col(f.target, ColType::BigInt))
            .collect();
        cols.extend_from_slice(self.measurements);
        cols
    }

    /// Numeric measurement columns subject to the "<0.1" sentinel mapping.
    pub fn numeric_columns(&self) -> Vec<&'static str> {
        self.measurements
            .iter()
            .filter(|c| matches!(c.ty, ColType::Float))
            .map(|c| c.name)
            .collect()
    }

    /// Chunk size for this table: the base, shrunk so that rows x columns
    /// stays within the bind-parameter budget of one INSERT.
    pub fn chunk_rows(&self) -> usize {
        let ncols = self.columns().len().max(1);
        (CHUNK_PARAM_BUDGET / ncols).clamp(1, BASE_CHUNK_ROWS)
    }

    /// CREATE TABLE + natural-key unique index. The index is NULLS NOT
    /// DISTINCT so rows with null FKs still deduplicate under ON CONFLICT
    /// DO NOTHING across resumed loads.
    pub fn ddl(&self) -> String {
        let mut cols = vec!["    id bigserial PRIMARY KEY".to_string()];
        for f in self.fks {
            cols.push(format!("    {} bigint REFERENCES {} (id)", f.target, f.dimension));
        }
        for m in self.measurements {
            let ty = match m.ty {
                ColType::BigInt => "bigint",
                ColType::Int => "int",
                ColType::Float => "double precision",
                ColType::Text => "text",
            };
            cols.push(format!("    {} {}", m.name, ty));
        }
        cols.push("    created_at timestamptz NOT NULL DEFAULT now()".to_string());
        cols.push("    updated_at timestamptz NOT NULL DEFAULT now()".to_string());

        format!(
            "CREATE TABLE IF NOT EXISTS {t} (\n{cols}\n);\n\
             CREATE UNIQUE INDEX IF NOT EXISTS {t}_natural_uq ON {t} ({nk}) NULLS NOT DISTINCT;",
            t = self.name,
            cols = cols.join(",\n"),
            nk = self.natural_key.join(", ")
        )
    }
}

pub static FACTS: &[FactSpec] = &[
    FactSpec {
        name: "prices",
        csv: "datasets/prices/Prices_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("Item Code", "item_code"),
            ("Item Code (CPC)", "item_code_cpc"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Months Code", "months_code"),
            ("Months", "months"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "item_code", "item_code_cpc",
            "element_code", "months_code", "year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "item_code", "item_code_cpc",
            "item", "element_code", "element", "flag",
        ],
        measurements: &[
            col("months_code", ColType::Text),
            col("months", ColType::Text),
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "area_code_id", "item_code_id", "element_code_id", "months_code", "year_code",
        ],
    },
    FactSpec {
        name: "exchange_rate",
        csv: "datasets/exchange_rate/Exchange_rate_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("ISO Currency Code", "iso_currency_code"),
            ("Currency", "currency"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Months Code", "months_code"),
            ("Months", "months"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "iso_currency_code", "element_code",
            "months_code", "year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("currencies", "iso_currency_code_id"),
            fk("elements", "element_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "iso_currency_code", "currency",
            "element_code", "element", "flag",
        ],
        measurements: &[
            col("months_code", ColType::Text),
            col("months", ColType::Text),
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "area_code_id", "iso_currency_code_id", "element_code_id", "months_code", "year_code",
        ],
    },
    FactSpec {
        name: "emissions_land_use_forests",
        csv: "datasets/emissions_land_use_forests/Emissions_Land_Use_Forests_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("Item Code", "item_code"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Source Code", "source_code"),
            ("Source", "source"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "item_code", "element_code",
            "source_code", "year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("sources", "source_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "item_code", "item",
            "element_code", "element", "source_code", "source", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "area_code_id", "item_code_id", "element_code_id", "source_code_id", "year_code",
        ],
    },
    FactSpec {
        name: "production_crops_livestock",
        csv: "datasets/production_crops_livestock/Production_Crops_Livestock_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("Item Code", "item_code"),
            ("Item Code (CPC)", "item_code_cpc"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "item_code", "item_code_cpc",
            "element_code", "year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "item_code", "item_code_cpc",
            "item", "element_code", "element", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &["area_code_id", "item_code_id", "element_code_id", "year_code"],
    },
    FactSpec {
        name: "trade_crops_livestock",
        csv: "datasets/trade_crops_livestock/Trade_CropsLivestock_E_All_Data_(Normalized).csv",
        renames: &[
            ("Reporter Country Code", "reporter_country_code"),
            ("Reporter Country Code (M49)", "reporter_country_code_m49"),
            ("Reporter Countries", "reporter_countries"),
            ("Partner Country Code", "partner_country_code"),
            ("Partner Country Code (M49)", "partner_country_code_m49"),
            ("Partner Countries", "partner_countries"),
            ("Item Code", "item_code"),
            ("Item Code (CPC)", "item_code_cpc"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
        ],
        strip: &[
            "reporter_country_code", "reporter_country_code_m49",
            "partner_country_code", "partner_country_code_m49",
            "item_code", "item_code_cpc", "element_code", "year_code", "flag",
        ],
        fks: &[
            fk("reporter_country_codes", "reporter_country_code_id"),
            fk("partner_country_codes", "partner_country_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "reporter_country_code", "reporter_country_code_m49", "reporter_countries",
            "partner_country_code", "partner_country_code_m49", "partner_countries",
            "item_code", "item_code_cpc", "item", "element_code", "element", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
        ],
        natural_key: &[
            "reporter_country_code_id", "partner_country_code_id", "item_code_id",
            "element_code_id", "year_code",
        ],
    },
    FactSpec {
        name: "food_aid_shipments",
        csv: "datasets/food_aid_shipments/Food_Aid_Shipments_WFP_E_All_Data_(Normalized).csv",
        renames: &[
            ("Recipient Country Code", "recipient_country_code"),
            ("Recipient Country Code (M49)", "recipient_country_code_m49"),
            ("Recipient Country", "recipient_country"),
            ("Item Code", "item_code"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Purpose Code", "purpose_code"),
            ("Purpose", "purpose"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "recipient_country_code", "recipient_country_code_m49", "item_code",
            "element_code", "purpose_code", "year_code", "flag",
        ],
        fks: &[
            fk("recipient_country_codes", "recipient_country_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("purposes", "purpose_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "recipient_country_code", "recipient_country_code_m49", "recipient_country",
            "item_code", "item", "element_code", "element", "purpose_code", "purpose", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "recipient_country_code_id", "item_code_id", "element_code_id",
            "purpose_code_id", "year_code",
        ],
    },
    FactSpec {
        name: "development_assistance_to_agriculture",
        csv: "datasets/development_assistance_to_agriculture/Development_Assistance_to_Agriculture_E_All_Data_(Normalized).csv",
        renames: &[
            ("Donor Code", "donor_code"),
            ("Donor Code (M49)", "donor_code_m49"),
            ("Donor", "donor"),
            ("Recipient Country Code", "recipient_country_code"),
            ("Recipient Country Code (M49)", "recipient_country_code_m49"),
            ("Recipient Country", "recipient_country"),
            ("Item Code", "item_code"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Purpose Code", "purpose_code"),
            ("Purpose", "purpose"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "donor_code", "donor_code_m49", "recipient_country_code",
            "recipient_country_code_m49", "item_code", "element_code",
            "purpose_code", "year_code", "flag",
        ],
        fks: &[
            fk("donors", "donor_code_id"),
            fk("recipient_country_codes", "recipient_country_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("purposes", "purpose_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "donor_code", "donor_code_m49", "donor",
            "recipient_country_code", "recipient_country_code_m49", "recipient_country",
            "item_code", "item", "element_code", "element", "purpose_code", "purpose", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "donor_code_id", "recipient_country_code_id", "item_code_id",
            "element_code_id", "purpose_code_id", "year_code",
        ],
    },
    FactSpec {
        name: "employment_indicators",
        csv: "datasets/employment_indicators/Employment_Indicators_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("Indicator Code", "indicator_code"),
            ("Indicator", "indicator"),
            ("Sex Code", "sex_code"),
            ("Sex", "sex"),
            ("Industry Code", "industry_code"),
            ("Industry", "industry"),
            ("Source Code", "source_code"),
            ("Source", "source"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "indicator_code", "sex_code",
            "industry_code", "source_code", "year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("indicators", "indicator_code_id"),
            fk("sexs", "sex_code_id"),
            fk("industries", "industry_code_id"),
            fk("sources", "source_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "indicator_code", "indicator",
            "sex_code", "sex", "industry_code", "industry", "source_code", "source", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "area_code_id", "indicator_code_id", "sex_code_id", "industry_code_id",
            "source_code_id", "year_code",
        ],
    },
    FactSpec {
        name: "population",
        csv: "datasets/population/Population_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Sex Code", "sex_code"),
            ("Sex", "sex"),
            ("Population Age Group Code", "population_age_group_code"),
            ("Population Age Group", "population_age_group"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "element_code", "sex_code",
            "population_age_group_code", "year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("elements", "element_code_id"),
            fk("sexs", "sex_code_id"),
            fk("population_age_groups", "population_age_group_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "element_code", "element",
            "sex_code", "sex", "population_age_group_code", "population_age_group", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "area_code_id", "element_code_id", "sex_code_id",
            "population_age_group_code_id", "year_code",
        ],
    },
    FactSpec {
        name: "household_surveys",
        csv: "datasets/household_surveys/Indicators_from_Household_Surveys_E_All_Data_(Normalized).csv",
        renames: &[
            ("Survey Code", "survey_code"),
            ("Survey", "survey"),
            ("Indicator Code", "indicator_code"),
            ("Indicator", "indicator"),
            ("Food Group Code", "food_group_code"),
            ("Food Group", "food_group"),
            ("Food Value Code", "food_value_code"),
            ("Food Value", "food_value"),
            ("Geographic Level Code", "geographic_level_code"),
            ("Geographic Level", "geographic_level"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
        ],
        strip: &[
            "survey_code", "indicator_code", "food_group_code", "food_value_code",
            "geographic_level_code", "flag",
        ],
        fks: &[
            fk("surveys", "survey_code_id"),
            fk("indicators", "indicator_code_id"),
            fk("food_groups", "food_group_code_id"),
            fk("food_values", "food_value_code_id"),
            fk("geographic_levels", "geographic_level_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "survey_code", "survey", "indicator_code", "indicator",
            "food_group_code", "food_group", "food_value_code", "food_value",
            "geographic_level_code", "geographic_level", "flag",
        ],
        measurements: &[
            col("unit", ColType::Text),
            col("value", ColType::Float),
        ],
        natural_key: &[
            "survey_code_id", "indicator_code_id", "food_group_code_id",
            "food_value_code_id", "geographic_level_code_id",
        ],
    },
    FactSpec {
        name: "world_census_agriculture",
        csv: "datasets/world_census_agriculture/World_Census_Agriculture_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("Item Code", "item_code"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Factor Code", "factor_code"),
            ("Factor", "factor"),
            ("WCA Round Code", "wca_round_code"),
            ("WCA Round", "wca_round"),
            ("Census Year Code", "census_year_code"),
            ("Census Year", "census_year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "item_code", "element_code",
            "factor_code", "wca_round_code", "census_year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("factors", "factor_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "item_code", "item",
            "element_code", "element", "factor_code", "factor", "flag",
        ],
        measurements: &[
            col("wca_round_code", ColType::Text),
            col("wca_round", ColType::Text),
            col("census_year_code", ColType::Text),
            col("census_year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "area_code_id", "item_code_id", "element_code_id", "factor_code_id",
            "wca_round_code", "census_year_code",
        ],
    },
    FactSpec {
        name: "food_security_indicators",
        csv: "datasets/food_security_indicators/Food_Security_Indicators_E_All_Data_(Normalized).csv",
        renames: &[
            ("Area Code", "area_code"),
            ("Area Code (M49)", "area_code_m49"),
            ("Area", "area"),
            ("Item Code", "item_code"),
            ("Item", "item"),
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Release Code", "release_code"),
            ("Release", "release"),
            ("Year Code", "year_code"),
            ("Year", "year"),
            ("Unit", "unit"),
            ("Value", "value"),
            ("Flag", "flag"),
            ("Note", "note"),
        ],
        strip: &[
            "area_code", "area_code_m49", "item_code", "element_code",
            "release_code", "year_code", "flag",
        ],
        fks: &[
            fk("area_codes", "area_code_id"),
            fk("item_codes", "item_code_id"),
            fk("elements", "element_code_id"),
            fk("releases", "release_code_id"),
            fk("flags", "flag_id"),
        ],
        exclude: &[
            "area_code", "area_code_m49", "area", "item_code", "item",
            "element_code", "element", "release_code", "release", "flag",
        ],
        measurements: &[
            col("year_code", ColType::Text),
            col("year", ColType::Int),
            col("unit", ColType::Text),
            col("value", ColType::Float),
            col("note", ColType::Text),
        ],
        natural_key: &[
            "area_code_id", "item_code_id", "element_code_id", "release_code_id", "year_code",
        ],
    },
];

pub fn fact(name: &str) -> Option<&'static FactSpec> {
    FACTS.iter().find(|f| f.name == name)
}

/// Full schema DDL, in dependency order: ledger, dimensions, facts.
pub fn schema_ddl() -> Vec<String> {
    let mut statements = vec![crate::ledger::LEDGER_DDL.trim().to_string()];
    for r in REFERENCES {
        statements.push(r.ddl());
    }
    for f in FACTS {
        statements.push(f.ddl());
    }
    statements
}

// =============================================================================
// TESTS - the catalog is the schema; keep it internally consistent
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_fk_references_a_declared_dimension() {
        for f in FACTS {
            for k in f.fks {
                assert!(
                    dimension(k.dimension).is_some(),
                    "{}.{} references unknown dimension {}",
                    f.name,
                    k.target,
                    k.dimension
                );
            }
        }
    }

    #[test]
    fn test_natural_key_columns_exist() {
        for f in FACTS {
            let cols: Vec<&str> = f.columns().iter().map(|c| c.name).collect();
            for nk in f.natural_key {
                assert!(
                    cols.contains(nk),
                    "{} natural key column {} is not persisted",
                    f.name,
                    nk
                );
            }
        }
    }

    #[test]
    fn test_fk_targets_are_unique_per_fact() {
        for f in FACTS {
            let mut targets: Vec<&str> = f.fks.iter().map(|k| k.target).collect();
            targets.sort();
            targets.dedup();
            assert_eq!(targets.len(), f.fks.len(), "{} has duplicate fk targets", f.name);
        }
    }

    #[test]
    fn test_dimension_hash_columns_start_with_business_key() {
        // The fact side reads fingerprint inputs from frame columns named
        // after the dimension's hash columns; the first must be the business
        // key itself.
        for r in REFERENCES {
            assert_eq!(r.hash_columns[0], r.business_key, "{}", r.name);
            if r.has_source_dataset {
                assert_eq!(r.hash_columns, &[r.business_key, "source_dataset"], "{}", r.name);
            } else {
                assert_eq!(r.hash_columns, &[r.business_key], "{}", r.name);
            }
        }
    }

    #[test]
    fn test_flags_are_globally_shared() {
        let flags = dimension("flags").unwrap();
        assert!(!flags.has_source_dataset);
        assert_eq!(flags.hash_columns, &["flag"]);
        assert_eq!(flags.format, Format::Uppercase);
    }

    #[test]
    fn test_every_dimension_is_referenced_by_some_fact() {
        for r in REFERENCES {
            let used = FACTS
                .iter()
                .any(|f| f.fks.iter().any(|k| k.dimension == r.name));
            assert!(used, "dimension {} is referenced by no fact table", r.name);
        }
    }

    // -------------------------------------------------------------------------
    // CHUNK SIZING
    // -------------------------------------------------------------------------

    #[test]
    fn test_chunk_rows_bounded_by_param_budget() {
        for f in FACTS {
            let rows = f.chunk_rows();
            assert!(rows >= 1);
            assert!(rows <= BASE_CHUNK_ROWS);
            assert!(rows * f.columns().len() <= CHUNK_PARAM_BUDGET, "{}", f.name);
        }
    }

    #[test]
    fn test_wide_table_chunks_below_base() {
        // A 40+ column table must chunk strictly below the base.
        let wide_cols = 40;
        let rows = (CHUNK_PARAM_BUDGET / wide_cols).clamp(1, BASE_CHUNK_ROWS);
        assert!(rows < BASE_CHUNK_ROWS);
    }

    #[test]
    fn test_narrow_table_uses_base() {
        let narrow_cols = 3;
        let rows = (CHUNK_PARAM_BUDGET / narrow_cols).clamp(1, BASE_CHUNK_ROWS);
        assert_eq!(rows, BASE_CHUNK_ROWS);
    }

    // -------------------------------------------------------------------------
    // DDL GENERATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_reference_ddl_shape() {
        let ddl = dimension("area_codes").unwrap().ddl();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS area_codes"));
        assert!(ddl.contains("id bigint PRIMARY KEY"));
        assert!(ddl.contains("area_code text NOT NULL"));
        assert!(ddl.contains("source_dataset text NOT NULL"));
        assert!(ddl.contains("ON area_codes (area_code, source_dataset)"));
    }

    #[test]
    fn test_flags_ddl_has_no_source_dataset() {
        let ddl = dimension("flags").unwrap().ddl();
        assert!(!ddl.contains("source_dataset"));
        assert!(ddl.contains("ON flags (flag)"));
    }

    #[test]
    fn test_fact_ddl_shape() {
        let ddl = fact("prices").unwrap().ddl();
        assert!(ddl.contains("id bigserial PRIMARY KEY"));
        assert!(ddl.contains("area_code_id bigint REFERENCES area_codes (id)"));
        assert!(ddl.contains("value double precision"));
        assert!(ddl.contains("NULLS NOT DISTINCT"));
    }

    #[test]
    fn test_schema_ddl_orders_dimensions_before_facts() {
        let statements = schema_ddl();
        let dim_pos = statements
            .iter()
            .position(|s| s.contains("CREATE TABLE IF NOT EXISTS area_codes"))
            .unwrap();
        let fact_pos = statements
            .iter()
            .position(|s| s.contains("CREATE TABLE IF NOT EXISTS prices"))
            .unwrap();
        assert!(dim_pos < fact_pos);
    }
}
