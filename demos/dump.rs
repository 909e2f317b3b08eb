use std::env;
use std::fs::File;

use tagkit::{Result, TagContext, TagKind};

fn main() -> Result<()> {
    let path = env::args().nth(1).unwrap_or_else(|| "song.mp3".to_owned());
    let mut file = File::open(&path)?;

    let mut ctx = TagContext::new();
    let format = ctx.extract(&mut file, Some(&path), |f| match f.kind {
        TagKind::Image => println!("image: {} ({} bytes at {:#x})", f.text, f.size, f.offset),
        kind => println!("{kind:?}: {}", f.text),
    })?;

    let p = ctx.properties();
    println!("format: {format:?}");
    println!(
        "{} ch, {} Hz, {} kbit/s, {}",
        p.channels,
        p.sample_rate,
        p.bitrate / 1000,
        p.duration_display()
    );

    Ok(())
}
