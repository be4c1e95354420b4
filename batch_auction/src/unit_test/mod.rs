mod auction_test;
