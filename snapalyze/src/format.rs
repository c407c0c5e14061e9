// Generic formatting code for a set of data extracted from a data structure to be presented
// columnar or as csv, with or without a header.

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

/// Formatting options that can be mixed into the field list: `csv`, `fixed`, `header`,
/// `noheader`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatOptions {
    pub header: bool,
    pub csv: bool,
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`

pub fn parse_fields<'a, DataT, FmtT, CtxT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
) -> (Vec<&'a str>, HashSet<&'a str>)
where
    FmtT: Fn(DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.get(x).is_some() {
            fields.push(x);
        } else {
            others.insert(x);
        }
    }
    (fields, others)
}

/// Interpret the non-field strings of a spec as formatting options.  Fixed-width output has a
/// header by default, csv does not.  Anything that is not an option is an error.

pub fn standard_options(others: &HashSet<&str>) -> Result<FormatOptions> {
    for x in others {
        match *x {
            "csv" | "fixed" | "header" | "noheader" | "" => {}
            _ => bail!("Unknown field or option '{x}'"),
        }
    }
    let csv = others.contains("csv") && !others.contains("fixed");
    let header = if others.contains("noheader") {
        false
    } else if others.contains("header") {
        true
    } else {
        !csv
    };
    Ok(FormatOptions { header, csv })
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  See FormatOptions for the options.

pub fn format_data<'a, DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: &'a [DataT],
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&'a DataT, CtxT) -> String,
    CtxT: Copy,
{
    // Rows of formatted values, the fields having been looked up once.
    let fmts = fields
        .iter()
        .map(|kwd| &formatters[*kwd])
        .collect::<Vec<&FmtT>>();
    let rows = data
        .iter()
        .map(|x| fmts.iter().map(|f| f(x, ctx)).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    if opts.csv {
        let mut wtr = csv::Writer::from_writer(output);
        if opts.header {
            wtr.write_record(fields)?;
        }
        for row in &rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        return Ok(());
    }

    // The column width is the max across all the entries in the column (including header, if
    // present)
    let mut widths = vec![0; fields.len()];
    if opts.header {
        for (w, kwd) in widths.iter_mut().zip(fields.iter()) {
            *w = usize::max(*w, kwd.len());
        }
    }
    for row in &rows {
        for (w, val) in widths.iter_mut().zip(row.iter()) {
            *w = usize::max(*w, val.len());
        }
    }

    if opts.header {
        write_fixed(output, &widths, fields.iter().copied())?;
    }
    for row in &rows {
        write_fixed(output, &widths, row.iter().map(|s| s.as_str()))?;
    }
    Ok(())
}

fn write_fixed<'b>(
    output: &mut dyn io::Write,
    widths: &[usize],
    vals: impl Iterator<Item = &'b str>,
) -> Result<()> {
    let line = widths
        .iter()
        .zip(vals)
        .map(|(&w, v)| format!("{:w$}", v))
        .collect::<Vec<String>>()
        .join("  ");
    writeln!(output, "{}", line.trim_end())?;
    Ok(())
}

#[cfg(test)]
type TestDatum<'a> = &'a (u32, &'static str);

#[cfg(test)]
fn format_num(d: TestDatum, _: ()) -> String {
    format!("{}", d.0)
}

#[cfg(test)]
fn format_name(d: TestDatum, _: ()) -> String {
    d.1.to_string()
}

#[cfg(test)]
fn test_formatters() -> HashMap<String, &'static dyn Fn(TestDatum, ()) -> String> {
    let mut formatters: HashMap<String, &'static dyn Fn(TestDatum, ()) -> String> = HashMap::new();
    formatters.insert("num".to_string(), &format_num);
    formatters.insert("name".to_string(), &format_name);
    formatters
}

#[test]
fn test_parse_fields() {
    let formatters = test_formatters();
    let (fields, others) = parse_fields("name,csv,num,bogus", &formatters);
    assert!(fields == vec!["name", "num"]);
    assert!(others.len() == 2 && others.contains("csv") && others.contains("bogus"));
    assert!(standard_options(&others).is_err());
}

#[test]
fn test_standard_options() {
    let o = standard_options(&HashSet::new()).unwrap();
    assert!(o == FormatOptions { header: true, csv: false });
    let o = standard_options(&HashSet::from(["csv"])).unwrap();
    assert!(o == FormatOptions { header: false, csv: true });
    let o = standard_options(&HashSet::from(["csv", "header"])).unwrap();
    assert!(o == FormatOptions { header: true, csv: true });
    let o = standard_options(&HashSet::from(["noheader"])).unwrap();
    assert!(o == FormatOptions { header: false, csv: false });
}

#[test]
fn test_format_fixed() {
    let formatters = test_formatters();
    let data = vec![(1u32, "alpha"), (1234u32, "b")];
    let mut out = Vec::new();
    let opts = FormatOptions { header: true, csv: false };
    format_data(&mut out, &["num", "name"], &formatters, &opts, &data, ()).unwrap();
    assert!(String::from_utf8(out).unwrap() == "num   name\n1     alpha\n1234  b\n");
}

#[test]
fn test_format_csv() {
    let formatters = test_formatters();
    let data = vec![(1u32, "a,b"), (2u32, "c")];
    let mut out = Vec::new();
    let opts = FormatOptions { header: true, csv: true };
    format_data(&mut out, &["name", "num"], &formatters, &opts, &data, ()).unwrap();
    assert!(String::from_utf8(out).unwrap() == "name,num\n\"a,b\",1\nc,2\n");
}
