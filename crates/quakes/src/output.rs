use anyhow::Result;
use prettytable::format::consts::FORMAT_CLEAN;
use prettytable::{Row, Table, cell, row};

use crate::model::Quake;

pub fn print_table(quakes: &[Quake]) {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.set_titles(row![b => "Code", "Magnitude", "Time", "Place", "Latitude", "Longitude"]);

    for quake in quakes {
        let mut row = Row::empty();
        row.add_cell(cell!(quake.code));
        row.add_cell(cell!(r->format!("{:.2}", quake.magnitude)));
        row.add_cell(cell!(quake.time.format("%Y-%m-%d %H:%M:%S")));
        row.add_cell(cell!(quake.place));

        match quake.location {
            Some(location) => {
                row.add_cell(cell!(r->format!("{:.4}", location.latitude)));
                row.add_cell(cell!(r->format!("{:.4}", location.longitude)));
            }
            None => row.add_cell(cell!("unknown").with_hspan(2)),
        }

        table.add_row(row);
    }

    table.printstd();
}

pub fn print_json(quakes: &[Quake]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(quakes)?);
    Ok(())
}
