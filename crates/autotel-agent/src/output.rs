use autotel_domain::ServiceInfo;

/// Human-readable service table for `autotel discover --output text`.
pub fn print_services_text(services: &[ServiceInfo]) {
    if services.is_empty() {
        println!("no services detected");
        return;
    }
    println!("{:<15} {:<10} {:<22} {:<30}", "SERVICE", "CONFIDENCE", "ENDPOINT", "SIGNALS");
    for svc in services {
        let endpoint = svc
            .primary_endpoint()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        let signals: Vec<String> = svc.discovered_by.iter().map(|s| s.to_string()).collect();
        println!(
            "{:<15} {:<10} {:<22} {:<30}",
            svc.kind,
            svc.confidence,
            endpoint,
            signals.join(",")
        );
    }
}
