fn main() {
    screentime_compliance_lib::run()
}
