use contact_relay::notification::generate_vapid_keys;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }
    if let Some(unknown) = args.iter().find(|a| a.as_str() != "--json") {
        anyhow::bail!("unknown argument '{}' (see --help)", unknown);
    }

    let (public_b64, private_b64) = generate_vapid_keys();

    if args.iter().any(|a| a == "--json") {
        let keys = serde_json::json!({
            "public_key": public_b64,
            "private_key": private_b64,
        });
        println!("{}", serde_json::to_string(&keys)?);
    } else {
        println!("PUBLIC_VAPID_KEY={}", public_b64);
        println!("PRIVATE_VAPID_KEY={}", private_b64);
    }

    Ok(())
}

fn print_help() {
    println!("contact-relay-vapid - Generate a VAPID key pair for web push");
    println!();
    println!("Usage:");
    println!("  contact-relay-vapid           # prints .env lines");
    println!("  contact-relay-vapid --json    # prints JSON");
    println!();
    println!("Environment variables read by contact-relay:");
    println!("  PUBLIC_VAPID_KEY=<public key>");
    println!("  PRIVATE_VAPID_KEY=<private key>");
    println!("  WEB_PUSH_VAPID_SUBJECT=mailto:you@example.com   # defaults to mailto:$EMAIL_USER");
}
