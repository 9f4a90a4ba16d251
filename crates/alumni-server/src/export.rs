use csv::{QuoteStyle, Terminator, WriterBuilder};
use entity::alumni;

use crate::error::{Error, Result};
use crate::util::ts_to_fr_date;

pub const EXPORT_FILENAME: &str = "alumni-export.csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const HEADER: [&str; 13] = [
    "Prénom",
    "Nom",
    "Email",
    "Promotion",
    "Diplôme",
    "Ville",
    "Entreprise",
    "Poste",
    "Téléphone",
    "LinkedIn",
    "Statut",
    "Actif",
    "Créé le",
];

fn row(a: &alumni::Model) -> [String; 13] {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        a.first_name.clone(),
        a.last_name.clone(),
        a.email.clone(),
        a.graduation_year.map(|y| y.to_string()).unwrap_or_default(),
        opt(&a.diploma),
        opt(&a.city),
        opt(&a.company),
        opt(&a.job_title),
        opt(&a.phone),
        opt(&a.linkedin_url),
        a.status.as_str().to_string(),
        if a.is_active { "Oui" } else { "Non" }.to_string(),
        ts_to_fr_date(a.created_at),
    ]
}

/// Render profiles as a spreadsheet-friendly CSV: BOM, `;` separated, every
/// cell quoted.
pub fn alumni_csv(profiles: &[alumni::Model]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(UTF8_BOM.to_vec());

    writer
        .write_record(HEADER)
        .map_err(|e| Error::Internal(format!("csv write failed: {e}")))?;
    for profile in profiles {
        writer
            .write_record(row(profile))
            .map_err(|e| Error::Internal(format!("csv write failed: {e}")))?;
    }

    let mut out = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("csv flush failed: {e}")))?;
    if out.last() == Some(&b'\n') {
        out.pop();
    }
    Ok(out)
}
