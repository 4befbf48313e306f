fn main() {
    navi_lib::run()
}
